//! Engine configuration.
//!
//! Loaded from `world_config.json` with support for environment variable
//! overrides of the most commonly tuned values.

use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::ActionLimits;
use crate::geometry::WorldBounds;

pub const BUILTIN_WORLD_CONFIG: &str = include_str!("data/world_config.json");

/// Root configuration for the world engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub world_bounds: WorldBounds,
    pub defaults: MachineDefaults,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub max_attack_steps: u32,
    pub layout: LayoutConfig,
    pub save_path: PathBuf,
    pub command_bind: SocketAddr,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_bounds: WorldBounds::default(),
            defaults: MachineDefaults::default(),
            queue_capacity: 100,
            poll_interval_ms: 100,
            shutdown_timeout_ms: 2_000,
            max_attack_steps: 100,
            layout: LayoutConfig::default(),
            save_path: PathBuf::from("world_state.json"),
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8005),
        }
    }
}

/// Values applied to registrations that leave a field unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineDefaults {
    pub life_value: i64,
    pub machine_type: String,
    pub size: f64,
    pub view_size: i64,
}

impl Default for MachineDefaults {
    fn default() -> Self {
        Self {
            life_value: 10,
            machine_type: "worker".to_string(),
            size: 1.0,
            view_size: 3,
        }
    }
}

/// Default obstacle layout restored on reset: a square perimeter wall at
/// `±wall_size` plus seeded interior obstacles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub wall_size: i64,
    pub interior_obstacle_count: usize,
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            wall_size: 15,
            interior_obstacle_count: 20,
            seed: 42,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse world config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read world config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid world config: {0}")]
    Invalid(String),
}

impl WorldConfig {
    /// The configuration compiled into the binary. Falls back to
    /// [`WorldConfig::default`] if the embedded file fails to parse.
    pub fn builtin() -> Self {
        match Self::from_json_str(BUILTIN_WORLD_CONFIG) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    target: "grid_world::config",
                    error = %err,
                    "world_config.builtin_invalid"
                );
                Self::default()
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.world_bounds.min <= self.world_bounds.max) {
            return Err(ConfigError::Invalid(format!(
                "world bounds min {} exceeds max {}",
                self.world_bounds.min, self.world_bounds.max
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        let wall = self.layout.wall_size as f64;
        if self.layout.wall_size < 0 || -wall < self.world_bounds.min || wall > self.world_bounds.max {
            return Err(ConfigError::Invalid(format!(
                "layout wall_size {} does not fit world bounds [{}, {}]",
                self.layout.wall_size, self.world_bounds.min, self.world_bounds.max
            )));
        }
        if self.defaults.life_value <= 0 {
            return Err(ConfigError::Invalid(
                "default life_value must be positive".to_string(),
            ));
        }
        if !(self.defaults.size.is_finite() && self.defaults.size > 0.0) {
            return Err(ConfigError::Invalid(
                "default size must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply overrides from an arbitrary variable source. Unparseable values
    /// are logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override::<f64>(&lookup, "WORLD_BOUNDS_MIN") {
            self.world_bounds.min = value;
        }
        if let Some(value) = parse_override::<f64>(&lookup, "WORLD_BOUNDS_MAX") {
            self.world_bounds.max = value;
        }
        if let Some(value) = parse_override::<i64>(&lookup, "DEFAULT_LIFE_VALUE") {
            self.defaults.life_value = value;
        }
        if let Some(value) = lookup("DEFAULT_MACHINE_TYPE") {
            self.defaults.machine_type = value;
        }
        if let Some(value) = parse_override::<f64>(&lookup, "DEFAULT_SIZE") {
            self.defaults.size = value;
        }
        if let Some(value) = parse_override::<i64>(&lookup, "DEFAULT_VIEW_SIZE") {
            self.defaults.view_size = value;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn action_limits(&self) -> ActionLimits {
        ActionLimits {
            bounds: self.world_bounds,
            max_attack_steps: self.max_attack_steps,
        }
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                target: "grid_world::config",
                variable = name,
                value = %raw,
                error = %err,
                "world_config.override_ignored"
            );
            None
        }
    }
}

/// Load configuration from `WORLD_CONFIG_PATH` or the default path, then
/// apply environment overrides. Returns the path the config came from, if any.
pub fn load_world_config_from_env() -> (WorldConfig, Option<PathBuf>) {
    let override_path = env::var("WORLD_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/world_config.json");
    let path = override_path.unwrap_or(default_path);

    let (mut config, source) = match WorldConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "grid_world::config",
                path = %path.display(),
                "world_config.loaded=file"
            );
            (config, Some(path))
        }
        Err(err) => {
            tracing::warn!(
                target: "grid_world::config",
                path = %path.display(),
                error = %err,
                "world_config.load_failed"
            );
            tracing::info!(target: "grid_world::config", "world_config.loaded=builtin");
            (WorldConfig::builtin(), None)
        }
    };

    config.apply_env_overrides();
    if let Err(err) = config.validate() {
        tracing::warn!(
            target: "grid_world::config",
            error = %err,
            "world_config.overrides_rejected"
        );
        config = WorldConfig::builtin();
    }
    (config, source)
}
