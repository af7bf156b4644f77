//! Owner-scoped visibility.
//!
//! Each active machine belonging to an owner reveals a square area whose
//! Chebyshev radius equals its `view_size`. Destroyed machines reveal nothing
//! but are still listed as owned.

use serde::Serialize;
use world_schema::{MachineState, ObstacleState, Position};

use crate::registry::Registry;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OwnerVisibility {
    pub owner: String,
    pub owned: Vec<MachineState>,
    /// Machines of other owners inside the revealed area.
    pub machines: Vec<MachineState>,
    pub obstacles: Vec<ObstacleState>,
}

impl OwnerVisibility {
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }
}

pub fn visible_to_owner(registry: &Registry, owner: &str) -> OwnerVisibility {
    let owned: Vec<MachineState> = registry
        .machines()
        .filter(|machine| machine.owner == owner)
        .cloned()
        .collect();
    let observers: Vec<&MachineState> = owned.iter().filter(|m| m.is_active()).collect();

    let seen = |position: &Position| {
        observers.iter().any(|observer| {
            observer.position.square_distance_to(position) <= f64::from(observer.view_size)
        })
    };

    let machines = registry
        .machines()
        .filter(|machine| machine.owner != owner && seen(&machine.position))
        .cloned()
        .collect();
    let obstacles = registry
        .obstacles()
        .filter(|obstacle| seen(&obstacle.position))
        .cloned()
        .collect();

    OwnerVisibility {
        owner: owner.to_string(),
        owned,
        machines,
        obstacles,
    }
}

#[cfg(test)]
mod tests {
    use world_schema::{Facing, MachineStatus};

    use super::*;

    fn machine(id: &str, owner: &str, x: f64, y: f64) -> MachineState {
        MachineState {
            machine_id: id.to_string(),
            position: Position::planar(x, y),
            life_value: 10,
            machine_type: "worker".to_string(),
            owner: owner.to_string(),
            status: MachineStatus::Active,
            last_action: None,
            size: 1.0,
            facing_direction: Facing::EAST,
            view_size: 3,
        }
    }

    fn ids(machines: &[MachineState]) -> Vec<&str> {
        machines.iter().map(|m| m.machine_id.as_str()).collect()
    }

    #[test]
    fn owner_sees_neighbourhood_of_each_machine() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("a1", "alice", 0.0, 0.0));
        registry.insert_machine(machine("a2", "alice", 20.0, 0.0));
        registry.insert_machine(machine("b1", "bob", 3.0, -3.0));
        registry.insert_machine(machine("b2", "bob", 10.0, 0.0));
        registry.insert_machine(machine("b3", "bob", 22.0, 2.0));
        registry.insert_obstacle(ObstacleState::new("near", Position::planar(-2.0, 1.0)));
        registry.insert_obstacle(ObstacleState::new("far", Position::planar(-9.0, 0.0)));

        let visibility = visible_to_owner(&registry, "alice");
        assert_eq!(ids(&visibility.owned), vec!["a1", "a2"]);
        assert_eq!(ids(&visibility.machines), vec!["b1", "b3"]);
        assert_eq!(visibility.obstacles.len(), 1);
        assert_eq!(visibility.obstacles[0].obstacle_id, "near");
    }

    #[test]
    fn destroyed_machines_reveal_nothing() {
        let mut registry = Registry::new();
        let mut wreck = machine("a1", "alice", 0.0, 0.0);
        wreck.status = MachineStatus::Destroyed;
        registry.insert_machine(wreck);
        registry.insert_machine(machine("b1", "bob", 1.0, 0.0));

        let visibility = visible_to_owner(&registry, "alice");
        assert_eq!(visibility.owned.len(), 1);
        assert!(visibility.machines.is_empty());
    }

    #[test]
    fn unknown_owner_sees_nothing() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("b1", "bob", 1.0, 0.0));
        assert!(visible_to_owner(&registry, "carol").is_empty());
    }
}
