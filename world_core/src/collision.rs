use std::fmt;

use serde::Serialize;
use world_schema::Position;

use crate::geometry::bodies_overlap;
use crate::registry::Registry;

/// One body that a candidate circle would overlap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollisionHit {
    Obstacle {
        obstacle_id: String,
        position: Position,
    },
    Machine {
        machine_id: String,
        position: Position,
    },
}

impl CollisionHit {
    pub fn id(&self) -> &str {
        match self {
            CollisionHit::Obstacle { obstacle_id, .. } => obstacle_id,
            CollisionHit::Machine { machine_id, .. } => machine_id,
        }
    }
}

impl fmt::Display for CollisionHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionHit::Obstacle {
                obstacle_id,
                position,
            } => write!(f, "obstacle {obstacle_id} at {position}"),
            CollisionHit::Machine {
                machine_id,
                position,
            } => write!(f, "machine {machine_id} at {position}"),
        }
    }
}

/// True if a body of `size` at `position` would overlap any obstacle or any
/// active machine other than `exclude`.
pub fn check_collision(
    registry: &Registry,
    position: &Position,
    size: f64,
    exclude: Option<&str>,
) -> bool {
    registry
        .obstacles()
        .any(|obstacle| bodies_overlap(position, size, &obstacle.position, obstacle.size))
        || registry.machines().any(|machine| {
            machine.is_active()
                && Some(machine.machine_id.as_str()) != exclude
                && bodies_overlap(position, size, &machine.position, machine.size)
        })
}

/// Every conflicting body, obstacles first, each group ordered by id.
pub fn find_collision_details(
    registry: &Registry,
    position: &Position,
    size: f64,
    exclude: Option<&str>,
) -> Vec<CollisionHit> {
    let obstacles = registry
        .obstacles()
        .filter(|obstacle| bodies_overlap(position, size, &obstacle.position, obstacle.size))
        .map(|obstacle| CollisionHit::Obstacle {
            obstacle_id: obstacle.obstacle_id.clone(),
            position: obstacle.position,
        });
    let machines = registry
        .machines()
        .filter(|machine| {
            machine.is_active()
                && Some(machine.machine_id.as_str()) != exclude
                && bodies_overlap(position, size, &machine.position, machine.size)
        })
        .map(|machine| CollisionHit::Machine {
            machine_id: machine.machine_id.clone(),
            position: machine.position,
        });
    obstacles.chain(machines).collect()
}
