use std::fmt;

use thiserror::Error;
use world_runtime::ActionParseError;
use world_schema::{MachineStatus, Position, PositionError};

use crate::collision::CollisionHit;
use crate::queue::QueueError;
use crate::storage::StorageError;

/// The two kinds of registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Machine,
    Obstacle,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Machine => write!(f, "machine"),
            EntityKind::Obstacle => write!(f, "obstacle"),
        }
    }
}

/// Every recoverable failure the engine reports. None of these indicate a
/// corrupted engine; they describe why a single request was refused.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: EntityKind, id: String },
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("position {position} collides with {}", describe_hits(.hits))]
    Collision {
        position: Position,
        hits: Vec<CollisionHit>,
    },
    #[error("position {0} is outside world bounds")]
    OutOfBounds(Position),
    #[error("direction vector has zero length")]
    InvalidDirection,
    #[error("command queue for machine {0} is full")]
    QueueFull(String),
    #[error("machine {id} is not active ({status})")]
    NotActive { id: String, status: MachineStatus },
    #[error("invalid position: {0}")]
    InvalidPosition(#[from] PositionError),
    #[error("invalid {field}: {reason}")]
    InvalidSpec { field: &'static str, reason: String },
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] ActionParseError),
    #[error("no storage backend configured")]
    StorageUnavailable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WorldError {
    pub fn machine_not_found(id: impl Into<String>) -> Self {
        WorldError::NotFound {
            kind: EntityKind::Machine,
            id: id.into(),
        }
    }

    pub fn obstacle_not_found(id: impl Into<String>) -> Self {
        WorldError::NotFound {
            kind: EntityKind::Obstacle,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_spec(field: &'static str, reason: impl Into<String>) -> Self {
        WorldError::InvalidSpec {
            field,
            reason: reason.into(),
        }
    }
}

impl From<QueueError> for WorldError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Full(id) => WorldError::QueueFull(id),
            QueueError::Missing(id) => WorldError::machine_not_found(id),
        }
    }
}

fn describe_hits(hits: &[CollisionHit]) -> String {
    hits.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
