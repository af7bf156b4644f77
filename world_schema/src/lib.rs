//! Data contracts shared by the grid world engine, its storage backends and
//! any transport layered on top of it.
//!
//! Everything here is plain data: positions, machine and obstacle records,
//! fog-of-war views, attack outcomes and the persisted [`WorldSnapshot`].

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use thiserror::Error;

/// Largest side length a machine view may have after normalization.
pub const MAX_VIEW_SIZE: u32 = 1001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position must have 2 or 3 coordinates, got {0}")]
    Arity(usize),
    #[error("position coordinates must be finite")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacingError {
    #[error("direction vector has zero length")]
    ZeroLength,
    #[error("facing direction must have exactly 2 components, got {0}")]
    Arity(usize),
}

/// A point on the world grid. Coordinates are rounded to the nearest integer
/// on construction, so two positions naming the same cell always compare
/// equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Position {
    x: f64,
    y: f64,
    z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.round(),
            y: y.round(),
            z: z.round(),
        }
    }

    pub fn planar(x: f64, y: f64) -> Self {
        Self::new(x, y, 0.0)
    }

    /// Build a position from a 2 or 3 element coordinate list. A missing `z`
    /// is treated as the ground plane.
    pub fn from_slice(coords: &[f64]) -> Result<Self, PositionError> {
        if coords.iter().any(|value| !value.is_finite()) {
            return Err(PositionError::NonFinite);
        }
        match *coords {
            [x, y] => Ok(Self::planar(x, y)),
            [x, y, z] => Ok(Self::new(x, y, z)),
            _ => Err(PositionError::Arity(coords.len())),
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    /// Integer grid cell in the horizontal plane.
    pub fn cell(&self) -> (i64, i64) {
        (self.x as i64, self.y as i64)
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Chebyshev distance, used for square visibility areas.
    pub fn square_distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    pub fn is_within_bounds(&self, min: f64, max: f64) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .all(|coord| (min..=max).contains(coord))
    }

    /// Translate by a (possibly fractional) offset and snap back to the grid.
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = PositionError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&value)
    }
}

impl From<Position> for Vec<f64> {
    fn from(value: Position) -> Self {
        value.to_array().to_vec()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Unit vector in the horizontal plane describing where a machine points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Facing {
    x: f64,
    y: f64,
}

impl Facing {
    pub const EAST: Facing = Facing { x: 1.0, y: 0.0 };

    pub fn from_vector(x: f64, y: f64) -> Result<Self, FacingError> {
        let length = (x * x + y * y).sqrt();
        if length == 0.0 || !length.is_finite() {
            return Err(FacingError::ZeroLength);
        }
        Ok(Self {
            x: x / length,
            y: y / length,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl Default for Facing {
    fn default() -> Self {
        Self::EAST
    }
}

impl TryFrom<Vec<f64>> for Facing {
    type Error = FacingError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        match *value.as_slice() {
            [x, y] => Self::from_vector(x, y),
            _ => Err(FacingError::Arity(value.len())),
        }
    }
}

impl From<Facing> for Vec<f64> {
    fn from(value: Facing) -> Self {
        value.to_array().to_vec()
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Force a requested view size onto the odd, positive grid sizes views use.
pub fn normalize_view_size(requested: i64) -> u32 {
    let clamped = requested.clamp(1, i64::from(MAX_VIEW_SIZE));
    let odd = if clamped % 2 == 0 { clamped + 1 } else { clamped };
    u32::try_from(odd.min(i64::from(MAX_VIEW_SIZE))).unwrap_or(MAX_VIEW_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    #[default]
    Active,
    Destroyed,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::Active => write!(f, "active"),
            MachineStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    pub machine_id: String,
    pub position: Position,
    pub life_value: i64,
    pub machine_type: String,
    pub owner: String,
    pub status: MachineStatus,
    pub last_action: Option<String>,
    pub size: f64,
    pub facing_direction: Facing,
    pub view_size: u32,
}

impl MachineState {
    pub fn is_active(&self) -> bool {
        self.status == MachineStatus::Active
    }
}

fn default_obstacle_size() -> f64 {
    1.0
}

fn default_obstacle_type() -> String {
    "static".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleState {
    pub obstacle_id: String,
    pub position: Position,
    #[serde(default = "default_obstacle_size")]
    pub size: f64,
    #[serde(default = "default_obstacle_type")]
    pub obstacle_type: String,
}

impl ObstacleState {
    pub fn new(obstacle_id: impl Into<String>, position: Position) -> Self {
        Self {
            obstacle_id: obstacle_id.into(),
            position,
            size: default_obstacle_size(),
            obstacle_type: default_obstacle_type(),
        }
    }
}

/// What a single view cell contains. Obstacles shadow machines sharing the
/// same cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "terrain", rename_all = "snake_case")]
pub enum Terrain {
    Empty,
    Obstacle {
        obstacle_id: String,
        obstacle_type: String,
        size: f64,
    },
    #[serde(rename = "self")]
    SelfCell,
    Machine {
        machine_id: String,
        machine_type: String,
        status: MachineStatus,
    },
}

impl Terrain {
    fn glyph(&self) -> char {
        match self {
            Terrain::Empty => '.',
            Terrain::Obstacle { .. } => '#',
            Terrain::SelfCell => '@',
            Terrain::Machine {
                status: MachineStatus::Active,
                ..
            } => 'M',
            Terrain::Machine {
                status: MachineStatus::Destroyed,
                ..
            } => 'x',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewCell {
    pub x: i64,
    pub y: i64,
    #[serde(flatten)]
    pub terrain: Terrain,
}

/// Fog-of-war grid centered on one machine. `cells[0]` is the northernmost
/// row and each row runs west to east.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineView {
    pub machine_id: String,
    pub center: [i64; 2],
    pub view_size: u32,
    pub cells: Vec<Vec<ViewCell>>,
}

impl MachineView {
    pub fn cell(&self, row: usize, column: usize) -> Option<&ViewCell> {
        self.cells.get(row).and_then(|cells| cells.get(column))
    }

    /// Compact text rendering: `#` obstacle, `@` viewer, `M` machine,
    /// `x` destroyed machine, `.` empty.
    pub fn to_ascii(&self) -> String {
        self.cells
            .iter()
            .map(|row| row.iter().map(|cell| cell.terrain.glyph()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaserCell {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hit_type", rename_all = "snake_case")]
pub enum HitResult {
    None,
    Obstacle { obstacle_id: String },
    Machine { machine_id: String, destroyed: bool },
}

impl fmt::Display for HitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitResult::None => write!(f, "miss"),
            HitResult::Obstacle { obstacle_id } => write!(f, "hit_obstacle_{obstacle_id}"),
            HitResult::Machine {
                machine_id,
                destroyed: true,
            } => write!(f, "destroyed_{machine_id}"),
            HitResult::Machine { machine_id, .. } => write!(f, "hit_machine_{machine_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub laser_path: Vec<LaserCell>,
    pub hit_result: HitResult,
    /// Damage actually applied; zero unless a machine was hit.
    pub damage: i64,
}

/// Result of a successfully executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Moved {
        new_position: Position,
        facing_direction: Facing,
    },
    FacingUpdated {
        facing_direction: Facing,
    },
    Attacked(AttackOutcome),
    Turned {
        facing_direction: Facing,
    },
}

#[derive(Debug, Error)]
pub enum SnapshotCodecError {
    #[error("bincode codec failed: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("json codec failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SnapshotHeader {
    pub saved_at_ms: u64,
    pub machine_count: u32,
    pub obstacle_count: u32,
    pub hash: u64,
}

/// Full registry contents as handed to a storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldSnapshot {
    pub header: SnapshotHeader,
    pub machines: Vec<MachineState>,
    pub obstacles: Vec<ObstacleState>,
}

impl WorldSnapshot {
    pub fn new(
        saved_at_ms: u64,
        machines: Vec<MachineState>,
        obstacles: Vec<ObstacleState>,
    ) -> Self {
        Self {
            header: SnapshotHeader {
                saved_at_ms,
                machine_count: machines.len() as u32,
                obstacle_count: obstacles.len() as u32,
                hash: 0,
            },
            machines,
            obstacles,
        }
    }

    pub fn finalize(mut self) -> Result<Self, SnapshotCodecError> {
        self.header.hash = hash_snapshot(&self)?;
        Ok(self)
    }
}

/// Content hash of a snapshot. The save timestamp and any existing hash are
/// excluded so identical registries hash identically.
pub fn hash_snapshot(snapshot: &WorldSnapshot) -> Result<u64, SnapshotCodecError> {
    let mut clone = snapshot.clone();
    clone.header.hash = 0;
    clone.header.saved_at_ms = 0;
    let encoded = bincode::serialize(&clone)?;
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    Ok(hasher.finish())
}

pub fn encode_snapshot(snapshot: &WorldSnapshot) -> Result<Vec<u8>, SnapshotCodecError> {
    Ok(bincode::serialize(snapshot)?)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<WorldSnapshot, SnapshotCodecError> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_snapshot_json(snapshot: &WorldSnapshot) -> Result<String, SnapshotCodecError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn decode_snapshot_json(data: &str) -> Result<WorldSnapshot, SnapshotCodecError> {
    Ok(serde_json::from_str(data)?)
}
