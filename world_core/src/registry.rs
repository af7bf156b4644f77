//! In-memory store of machines and obstacles.
//!
//! The registry itself is not synchronized; the engine keeps it behind a
//! single mutex and every read or write goes through that lock. Iteration is
//! ordered by id so that scans, views and snapshots are deterministic.

use std::collections::BTreeMap;

use world_schema::{normalize_view_size, MachineState, ObstacleState, WorldSnapshot};

#[derive(Debug, Default, Clone)]
pub struct Registry {
    machines: BTreeMap<String, MachineState>,
    obstacles: BTreeMap<String, ObstacleState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted records, re-applying the record
    /// invariants that a hand-edited snapshot might violate.
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        let mut registry = Self::new();
        for mut machine in snapshot.machines {
            machine.view_size = normalize_view_size(i64::from(machine.view_size));
            registry.insert_machine(machine);
        }
        registry.replace_obstacles(snapshot.obstacles);
        registry
    }

    pub fn snapshot(&self, saved_at_ms: u64) -> WorldSnapshot {
        WorldSnapshot::new(
            saved_at_ms,
            self.machines.values().cloned().collect(),
            self.obstacles.values().cloned().collect(),
        )
    }

    pub fn machine(&self, machine_id: &str) -> Option<&MachineState> {
        self.machines.get(machine_id)
    }

    pub fn machine_mut(&mut self, machine_id: &str) -> Option<&mut MachineState> {
        self.machines.get_mut(machine_id)
    }

    pub fn machines(&self) -> impl Iterator<Item = &MachineState> {
        self.machines.values()
    }

    pub fn machine_ids(&self) -> Vec<String> {
        self.machines.keys().cloned().collect()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn contains_machine(&self, machine_id: &str) -> bool {
        self.machines.contains_key(machine_id)
    }

    pub fn insert_machine(&mut self, machine: MachineState) -> Option<MachineState> {
        self.machines.insert(machine.machine_id.clone(), machine)
    }

    pub fn remove_machine(&mut self, machine_id: &str) -> Option<MachineState> {
        self.machines.remove(machine_id)
    }

    /// Drop every machine, returning how many were removed.
    pub fn clear_machines(&mut self) -> usize {
        let count = self.machines.len();
        self.machines.clear();
        count
    }

    pub fn obstacle(&self, obstacle_id: &str) -> Option<&ObstacleState> {
        self.obstacles.get(obstacle_id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &ObstacleState> {
        self.obstacles.values()
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    pub fn contains_obstacle(&self, obstacle_id: &str) -> bool {
        self.obstacles.contains_key(obstacle_id)
    }

    pub fn insert_obstacle(&mut self, obstacle: ObstacleState) -> Option<ObstacleState> {
        self.obstacles.insert(obstacle.obstacle_id.clone(), obstacle)
    }

    pub fn remove_obstacle(&mut self, obstacle_id: &str) -> Option<ObstacleState> {
        self.obstacles.remove(obstacle_id)
    }

    pub fn replace_obstacles(&mut self, obstacles: Vec<ObstacleState>) {
        self.obstacles = obstacles
            .into_iter()
            .map(|obstacle| (obstacle.obstacle_id.clone(), obstacle))
            .collect();
    }

    /// First obstacle (by id) whose rounded position lies on the given cell.
    pub fn obstacle_at_cell(&self, x: i64, y: i64) -> Option<&ObstacleState> {
        self.obstacles
            .values()
            .find(|obstacle| obstacle.position.cell() == (x, y))
    }

    /// First active machine (by id) on the given cell, ignoring `exclude`.
    pub fn active_machine_at_cell(
        &self,
        x: i64,
        y: i64,
        exclude: Option<&str>,
    ) -> Option<&MachineState> {
        self.machines.values().find(|machine| {
            machine.is_active()
                && Some(machine.machine_id.as_str()) != exclude
                && machine.position.cell() == (x, y)
        })
    }
}
