//! Fog-of-war view rendering.

use std::collections::HashMap;

use world_schema::{MachineState, MachineView, ObstacleState, Terrain, ViewCell};

use crate::registry::Registry;

/// Square window of side `view_size` centred on the machine's cell, or
/// `None` if the machine is unknown.
pub fn render_view(registry: &Registry, machine_id: &str) -> Option<MachineView> {
    let viewer = registry.machine(machine_id)?;
    let (cx, cy) = viewer.position.cell();
    let half = i64::from(viewer.view_size / 2);
    let in_window = |(x, y): (i64, i64)| (x - cx).abs() <= half && (y - cy).abs() <= half;

    let mut obstacles: HashMap<(i64, i64), &ObstacleState> = HashMap::new();
    for obstacle in registry.obstacles() {
        let cell = obstacle.position.cell();
        if in_window(cell) {
            obstacles.entry(cell).or_insert(obstacle);
        }
    }

    // An active machine standing on a wreck is the one reported.
    let mut machines: HashMap<(i64, i64), &MachineState> = HashMap::new();
    for machine in registry.machines() {
        let cell = machine.position.cell();
        if machine.machine_id == viewer.machine_id || !in_window(cell) {
            continue;
        }
        machines
            .entry(cell)
            .and_modify(|current| {
                if !current.is_active() && machine.is_active() {
                    *current = machine;
                }
            })
            .or_insert(machine);
    }

    let cells: Vec<Vec<ViewCell>> = (-half..=half)
        .rev()
        .map(|dy| {
            (-half..=half)
                .map(|dx| {
                    let (x, y) = (cx + dx, cy + dy);
                    let terrain = if let Some(obstacle) = obstacles.get(&(x, y)) {
                        Terrain::Obstacle {
                            obstacle_id: obstacle.obstacle_id.clone(),
                            obstacle_type: obstacle.obstacle_type.clone(),
                            size: obstacle.size,
                        }
                    } else if (x, y) == (cx, cy) {
                        Terrain::SelfCell
                    } else if let Some(machine) = machines.get(&(x, y)) {
                        Terrain::Machine {
                            machine_id: machine.machine_id.clone(),
                            machine_type: machine.machine_type.clone(),
                            status: machine.status,
                        }
                    } else {
                        Terrain::Empty
                    };
                    ViewCell { x, y, terrain }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    Some(MachineView {
        machine_id: viewer.machine_id.clone(),
        center: [cx, cy],
        view_size: viewer.view_size,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use world_schema::{Facing, MachineStatus, Position};

    use super::*;

    fn machine(id: &str, x: f64, y: f64, view_size: u32) -> MachineState {
        MachineState {
            machine_id: id.to_string(),
            position: Position::planar(x, y),
            life_value: 10,
            machine_type: "worker".to_string(),
            owner: String::new(),
            status: MachineStatus::Active,
            last_action: None,
            size: 1.0,
            facing_direction: Facing::EAST,
            view_size,
        }
    }

    #[test]
    fn unknown_machine_has_no_view() {
        assert!(render_view(&Registry::new(), "ghost").is_none());
    }

    #[test]
    fn obstacle_east_lands_in_middle_row_right_column() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 3));
        registry.insert_obstacle(ObstacleState::new("o1", Position::planar(1.0, 0.0)));

        let view = render_view(&registry, "m1").unwrap();
        assert_eq!(view.cells.len(), 3);
        assert!(view.cells.iter().all(|row| row.len() == 3));

        let cell = view.cell(1, 2).unwrap();
        assert_eq!((cell.x, cell.y), (1, 0));
        assert!(matches!(cell.terrain, Terrain::Obstacle { ref obstacle_id, .. } if obstacle_id == "o1"));
        assert_eq!(view.cell(1, 1).map(|c| &c.terrain), Some(&Terrain::SelfCell));
        // North is the first row.
        assert_eq!(view.cell(0, 0).map(|c| (c.x, c.y)), Some((-1, 1)));
    }

    #[test]
    fn ascii_map_shows_neighbours() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 10.0, 10.0, 5));
        registry.insert_machine(machine("m2", 11.0, 10.0, 3));
        let mut wreck = machine("m3", 8.0, 8.0, 3);
        wreck.status = MachineStatus::Destroyed;
        registry.insert_machine(wreck);
        registry.insert_machine(machine("far", 20.0, 20.0, 3));
        registry.insert_obstacle(ObstacleState::new("o1", Position::planar(10.0, 12.0)));

        let view = render_view(&registry, "m1").unwrap();
        assert_eq!(view.center, [10, 10]);
        assert_snapshot!(view.to_ascii(), @r###"
        ..#..
        .....
        ..@M.
        .....
        x....
        "###);
    }

    #[test]
    fn obstacle_shadows_machine_on_same_cell() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 3));
        let mut wreck = machine("m2", 0.0, 1.0, 3);
        wreck.status = MachineStatus::Destroyed;
        registry.insert_machine(wreck);
        registry.insert_obstacle(ObstacleState::new("o1", Position::planar(0.0, 1.0)));

        let view = render_view(&registry, "m1").unwrap();
        assert!(matches!(view.cell(0, 1).unwrap().terrain, Terrain::Obstacle { .. }));
    }
}
