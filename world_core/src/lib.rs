//! Authoritative state engine for a shared grid world.
//!
//! Machines and static obstacles live in a single registry guarded by one
//! mutex. Commanders submit move, attack and turn commands into bounded
//! per-machine queues which a background dispatch loop drains round-robin.
//! See [`WorldEngine`] for the public surface.

pub mod actions;
pub mod collision;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod view;
pub mod visibility;

pub use actions::ActionLimits;
pub use collision::{check_collision, find_collision_details, CollisionHit};
pub use config::{
    load_world_config_from_env, ConfigError, LayoutConfig, MachineDefaults, WorldConfig,
    BUILTIN_WORLD_CONFIG,
};
pub use dispatch::{CommandExecutor, DispatchLoop, DispatchStats, TickReport};
pub use engine::{MachineSpec, ObstacleSpec, ResetSummary, SubmitOutcome, WorldEngine};
pub use error::{EntityKind, WorldError};
pub use geometry::WorldBounds;
pub use layout::default_obstacles;
pub use queue::{CommandQueues, QueueError, QueueHandle};
pub use registry::Registry;
pub use storage::{BincodeFileStorage, JsonFileStorage, MemoryStorage, StorageError, WorldStorage};
pub use view::render_view;
pub use visibility::{visible_to_owner, OwnerVisibility};

pub use world_runtime::{Action, ActionParseError, Command};
pub use world_schema::{
    ActionOutcome, AttackOutcome, Facing, HitResult, LaserCell, MachineState, MachineStatus,
    MachineView, ObstacleState, Position, SnapshotHeader, Terrain, ViewCell, WorldSnapshot,
};
