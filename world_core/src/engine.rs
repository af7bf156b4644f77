//! The world facade.
//!
//! [`WorldEngine`] owns the registry, the per-machine queues and the dispatch
//! loop. Every registry access goes through one mutex; when both the registry
//! and the queue map are needed the registry is locked first.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use world_runtime::{Action, Command};
use world_schema::{
    normalize_view_size, ActionOutcome, Facing, MachineState, MachineStatus, MachineView,
    ObstacleState, Position, SnapshotHeader, WorldSnapshot,
};

use crate::actions::{self, ActionLimits};
use crate::collision::find_collision_details;
use crate::config::WorldConfig;
use crate::dispatch::{CommandExecutor, DispatchLoop, DispatchStats, TickReport};
use crate::error::{EntityKind, WorldError};
use crate::layout::default_obstacles;
use crate::queue::CommandQueues;
use crate::registry::Registry;
use crate::storage::{StorageError, WorldStorage};
use crate::view::render_view;
use crate::visibility::{visible_to_owner, OwnerVisibility};

/// Registration request for a machine. Unset fields take the configured
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSpec {
    pub machine_id: String,
    pub position: Vec<f64>,
    pub life_value: Option<i64>,
    pub machine_type: Option<String>,
    pub owner: Option<String>,
    pub size: Option<f64>,
    pub facing_direction: Option<[f64; 2]>,
    pub view_size: Option<i64>,
}

impl MachineSpec {
    pub fn new(machine_id: impl Into<String>, position: impl Into<Vec<f64>>) -> Self {
        Self {
            machine_id: machine_id.into(),
            position: position.into(),
            ..Self::default()
        }
    }

    pub fn life_value(mut self, life_value: i64) -> Self {
        self.life_value = Some(life_value);
        self
    }

    pub fn machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = Some(machine_type.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn facing(mut self, direction: [f64; 2]) -> Self {
        self.facing_direction = Some(direction);
        self
    }

    pub fn view_size(mut self, view_size: i64) -> Self {
        self.view_size = Some(view_size);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleSpec {
    pub obstacle_id: String,
    pub position: Vec<f64>,
    pub size: Option<f64>,
    pub obstacle_type: Option<String>,
}

impl ObstacleSpec {
    pub fn new(obstacle_id: impl Into<String>, position: impl Into<Vec<f64>>) -> Self {
        Self {
            obstacle_id: obstacle_id.into(),
            position: position.into(),
            ..Self::default()
        }
    }

    pub fn size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn obstacle_type(mut self, obstacle_type: impl Into<String>) -> Self {
        self.obstacle_type = Some(obstacle_type.into());
        self
    }
}

/// Acknowledgement for an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub machine_id: String,
    /// Commands waiting for this machine, including the new one.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub machines_removed: usize,
    pub commands_discarded: usize,
    pub obstacles_seeded: usize,
}

/// State shared between the facade and the dispatch worker.
struct WorldShared {
    config: WorldConfig,
    limits: ActionLimits,
    registry: Mutex<Registry>,
    queues: Arc<CommandQueues>,
    storage: Option<Arc<dyn WorldStorage>>,
}

impl WorldShared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandExecutor for WorldShared {
    fn execute(&self, command: &Command, generation: u64) -> Result<ActionOutcome, WorldError> {
        let mut registry = self.registry();
        // Commands from a removed queue never reach a re-registered machine.
        if !self.queues.is_current(&command.machine_id, generation) {
            return Err(WorldError::machine_not_found(command.machine_id.as_str()));
        }
        actions::execute(
            &mut registry,
            &self.limits,
            &command.machine_id,
            &command.action,
        )
    }
}

pub struct WorldEngine {
    shared: Arc<WorldShared>,
    dispatcher: Mutex<DispatchLoop>,
}

impl WorldEngine {
    /// Engine seeded with the default obstacle layout. The dispatch loop is
    /// not started; call [`WorldEngine::start`] or use [`WorldEngine::launch`].
    pub fn new(config: WorldConfig) -> Self {
        let engine = Self::build(config, None);
        engine.seed_default_layout();
        engine
    }

    /// [`WorldEngine::new`] with the dispatch loop already running.
    pub fn launch(config: WorldConfig) -> Self {
        let engine = Self::new(config);
        engine.start();
        engine
    }

    /// Restore from `storage` when it holds a snapshot, otherwise seed the
    /// default layout. A snapshot that fails to load is logged and ignored.
    pub fn with_storage(config: WorldConfig, storage: Arc<dyn WorldStorage>) -> Self {
        let engine = Self::build(config, Some(storage));
        match engine.load() {
            Ok(true) => {}
            Ok(false) => {
                info!(target: "grid_world::engine", "world.restore=none");
                engine.seed_default_layout();
            }
            Err(err) => {
                warn!(
                    target: "grid_world::engine",
                    error = %err,
                    "world.restore_failed"
                );
                engine.seed_default_layout();
            }
        }
        engine
    }

    fn build(config: WorldConfig, storage: Option<Arc<dyn WorldStorage>>) -> Self {
        let queues = Arc::new(CommandQueues::new(config.queue_capacity));
        let shared = Arc::new(WorldShared {
            limits: config.action_limits(),
            registry: Mutex::new(Registry::new()),
            queues: Arc::clone(&queues),
            storage,
            config,
        });
        let dispatcher = DispatchLoop::new(
            queues,
            shared.clone(),
            shared.config.poll_interval(),
            shared.config.shutdown_timeout(),
        );
        Self {
            shared,
            dispatcher: Mutex::new(dispatcher),
        }
    }

    fn seed_default_layout(&self) {
        let obstacles = default_obstacles(&self.shared.config.layout);
        self.shared.registry().replace_obstacles(obstacles);
    }

    fn dispatcher(&self) -> MutexGuard<'_, DispatchLoop> {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &WorldConfig {
        &self.shared.config
    }

    pub fn register_machine(&self, spec: MachineSpec) -> Result<MachineState, WorldError> {
        let machine = self.build_machine(spec)?;
        let mut registry = self.shared.registry();
        if registry.contains_machine(&machine.machine_id) {
            return Err(WorldError::AlreadyExists {
                kind: EntityKind::Machine,
                id: machine.machine_id,
            });
        }
        let hits = find_collision_details(&registry, &machine.position, machine.size, None);
        if !hits.is_empty() {
            return Err(WorldError::Collision {
                position: machine.position,
                hits,
            });
        }

        registry.insert_machine(machine.clone());
        self.shared.queues.create(&machine.machine_id);
        info!(
            target: "grid_world::engine",
            machine_id = %machine.machine_id,
            position = %machine.position,
            owner = %machine.owner,
            "machine.registered"
        );
        Ok(machine)
    }

    fn build_machine(&self, spec: MachineSpec) -> Result<MachineState, WorldError> {
        let defaults = &self.shared.config.defaults;
        if spec.machine_id.trim().is_empty() {
            return Err(WorldError::invalid_spec("machine_id", "must not be empty"));
        }
        let position = Position::from_slice(&spec.position)?;
        if !self.shared.limits.bounds.contains(&position) {
            return Err(WorldError::OutOfBounds(position));
        }
        let life_value = spec.life_value.unwrap_or(defaults.life_value);
        if life_value <= 0 {
            return Err(WorldError::invalid_spec(
                "life_value",
                format!("{life_value} must be positive"),
            ));
        }
        let size = spec.size.unwrap_or(defaults.size);
        if !size.is_finite() || size <= 0.0 {
            return Err(WorldError::invalid_spec(
                "size",
                format!("{size} must be a positive number"),
            ));
        }
        let facing_direction = match spec.facing_direction {
            Some([x, y]) => Facing::from_vector(x, y).map_err(|_| WorldError::InvalidDirection)?,
            None => Facing::EAST,
        };

        Ok(MachineState {
            machine_id: spec.machine_id,
            position,
            life_value,
            machine_type: spec
                .machine_type
                .unwrap_or_else(|| defaults.machine_type.clone()),
            owner: spec.owner.unwrap_or_default(),
            status: MachineStatus::Active,
            last_action: None,
            size,
            facing_direction,
            view_size: normalize_view_size(spec.view_size.unwrap_or(defaults.view_size)),
        })
    }

    pub fn register_obstacle(&self, spec: ObstacleSpec) -> Result<ObstacleState, WorldError> {
        if spec.obstacle_id.trim().is_empty() {
            return Err(WorldError::invalid_spec("obstacle_id", "must not be empty"));
        }
        let position = Position::from_slice(&spec.position)?;
        if !self.shared.limits.bounds.contains(&position) {
            return Err(WorldError::OutOfBounds(position));
        }
        let mut obstacle = ObstacleState::new(spec.obstacle_id, position);
        if let Some(size) = spec.size {
            if !size.is_finite() || size <= 0.0 {
                return Err(WorldError::invalid_spec(
                    "size",
                    format!("{size} must be a positive number"),
                ));
            }
            obstacle.size = size;
        }
        if let Some(obstacle_type) = spec.obstacle_type {
            obstacle.obstacle_type = obstacle_type;
        }

        let mut registry = self.shared.registry();
        if registry.contains_obstacle(&obstacle.obstacle_id) {
            return Err(WorldError::AlreadyExists {
                kind: EntityKind::Obstacle,
                id: obstacle.obstacle_id,
            });
        }
        let hits = find_collision_details(&registry, &obstacle.position, obstacle.size, None);
        if !hits.is_empty() {
            return Err(WorldError::Collision {
                position: obstacle.position,
                hits,
            });
        }
        registry.insert_obstacle(obstacle.clone());
        debug!(
            target: "grid_world::engine",
            obstacle_id = %obstacle.obstacle_id,
            position = %obstacle.position,
            "obstacle.registered"
        );
        Ok(obstacle)
    }

    /// Queue `action` for later execution by the dispatch loop. Never waits
    /// for execution.
    pub fn submit_command(
        &self,
        machine_id: &str,
        action: Action,
    ) -> Result<SubmitOutcome, WorldError> {
        let registry = self.shared.registry();
        let machine = registry
            .machine(machine_id)
            .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
        if !machine.is_active() {
            return Err(WorldError::NotActive {
                id: machine_id.to_string(),
                status: machine.status,
            });
        }
        let action_name = action.name();
        let queue_depth = self
            .shared
            .queues
            .enqueue(machine_id, Command::new(machine_id, action))?;
        drop(registry);

        debug!(
            target: "grid_world::engine",
            machine_id,
            action = action_name,
            queue_depth,
            "command.accepted"
        );
        Ok(SubmitOutcome {
            machine_id: machine_id.to_string(),
            queue_depth,
        })
    }

    /// Submit an action given by name with a free-form parameter map.
    pub fn submit_raw(
        &self,
        machine_id: &str,
        action: &str,
        params: &Map<String, Value>,
    ) -> Result<SubmitOutcome, WorldError> {
        let action = Action::from_params(action, params)?;
        self.submit_command(machine_id, action)
    }

    /// Run `action` immediately on the calling thread, bypassing the queue.
    pub fn execute_now(&self, machine_id: &str, action: &Action) -> Result<ActionOutcome, WorldError> {
        let mut registry = self.shared.registry();
        actions::execute(&mut registry, &self.shared.limits, machine_id, action)
    }

    pub fn remove_machine(&self, machine_id: &str) -> Result<MachineState, WorldError> {
        let mut registry = self.shared.registry();
        let removed = registry
            .remove_machine(machine_id)
            .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
        let discarded = self.shared.queues.remove(machine_id).unwrap_or(0);
        info!(
            target: "grid_world::engine",
            machine_id,
            discarded,
            "machine.removed"
        );
        Ok(removed)
    }

    pub fn remove_obstacle(&self, obstacle_id: &str) -> Result<ObstacleState, WorldError> {
        self.shared
            .registry()
            .remove_obstacle(obstacle_id)
            .ok_or_else(|| WorldError::obstacle_not_found(obstacle_id))
    }

    pub fn machine(&self, machine_id: &str) -> Option<MachineState> {
        self.shared.registry().machine(machine_id).cloned()
    }

    pub fn machines(&self) -> Vec<MachineState> {
        self.shared.registry().machines().cloned().collect()
    }

    pub fn obstacle(&self, obstacle_id: &str) -> Option<ObstacleState> {
        self.shared.registry().obstacle(obstacle_id).cloned()
    }

    pub fn obstacles(&self) -> Vec<ObstacleState> {
        self.shared.registry().obstacles().cloned().collect()
    }

    pub fn view(&self, machine_id: &str) -> Result<MachineView, WorldError> {
        render_view(&self.shared.registry(), machine_id)
            .ok_or_else(|| WorldError::machine_not_found(machine_id))
    }

    pub fn visible_to_owner(&self, owner: &str) -> OwnerVisibility {
        visible_to_owner(&self.shared.registry(), owner)
    }

    pub fn pending_commands(&self, machine_id: &str) -> usize {
        self.shared.queues.len(machine_id)
    }

    pub fn queue_depths(&self) -> BTreeMap<String, usize> {
        self.shared.queues.depths()
    }

    /// Drop every machine and queued command and restore the default
    /// obstacle layout.
    pub fn reset(&self) -> ResetSummary {
        let obstacles = default_obstacles(&self.shared.config.layout);
        let obstacles_seeded = obstacles.len();

        let mut registry = self.shared.registry();
        let machines_removed = registry.clear_machines();
        let commands_discarded = self.shared.queues.clear();
        registry.replace_obstacles(obstacles);
        drop(registry);

        info!(
            target: "grid_world::engine",
            machines_removed,
            commands_discarded,
            obstacles_seeded,
            "world.reset"
        );
        ResetSummary {
            machines_removed,
            commands_discarded,
            obstacles_seeded,
        }
    }

    /// Consistent copy of the registry with its content hash filled in.
    pub fn snapshot(&self) -> Result<WorldSnapshot, WorldError> {
        let snapshot = self.shared.registry().snapshot(now_ms());
        snapshot
            .finalize()
            .map_err(|err| WorldError::Storage(StorageError::from(err)))
    }

    pub fn save(&self) -> Result<SnapshotHeader, WorldError> {
        let storage = self
            .shared
            .storage
            .as_ref()
            .ok_or(WorldError::StorageUnavailable)?;
        let snapshot = self.snapshot()?;
        storage.save(&snapshot)?;
        info!(
            target: "grid_world::engine",
            machines = snapshot.header.machine_count,
            obstacles = snapshot.header.obstacle_count,
            hash = snapshot.header.hash,
            "world.saved"
        );
        Ok(snapshot.header)
    }

    /// Replace the registry with the stored snapshot. Queues are recreated
    /// empty for every restored machine. Returns `false` if storage was empty.
    pub fn load(&self) -> Result<bool, WorldError> {
        let storage = self
            .shared
            .storage
            .as_ref()
            .ok_or(WorldError::StorageUnavailable)?;
        let Some(snapshot) = storage.load()? else {
            return Ok(false);
        };
        self.restore(snapshot);
        Ok(true)
    }

    /// Install `snapshot` as the current world.
    pub fn restore(&self, snapshot: WorldSnapshot) {
        let saved_at_ms = snapshot.header.saved_at_ms;
        let restored = Registry::from_snapshot(snapshot);

        let mut registry = self.shared.registry();
        *registry = restored;
        let discarded = self.shared.queues.clear();
        for machine_id in registry.machine_ids() {
            self.shared.queues.create(&machine_id);
        }
        info!(
            target: "grid_world::engine",
            machines = registry.machine_count(),
            obstacles = registry.obstacle_count(),
            discarded,
            saved_at_ms,
            "world.restored"
        );
    }

    pub fn start(&self) -> bool {
        self.dispatcher().start()
    }

    pub fn stop(&self) -> bool {
        self.dispatcher().stop()
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher().is_running()
    }

    /// Run one dispatch tick synchronously. `None` while the loop is running.
    pub fn tick_once(&self) -> Option<TickReport> {
        self.dispatcher().tick_once()
    }

    /// Tick until every queue is empty or `max_ticks` ticks have run.
    /// Returns the number of ticks performed.
    pub fn drain(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks {
            match self.tick_once() {
                Some(report) if report.dequeued > 0 => ticks += 1,
                _ => break,
            }
        }
        ticks
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher().stats()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
