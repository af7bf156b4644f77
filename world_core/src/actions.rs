//! Action executor.
//!
//! Every handler runs with exclusive access to the [`Registry`] and validates
//! fully before touching any record, so a rejected action never leaves a
//! partial mutation behind.

use world_runtime::Action;
use world_schema::{
    ActionOutcome, AttackOutcome, Facing, HitResult, LaserCell, MachineStatus, Position,
};

use crate::collision::find_collision_details;
use crate::error::WorldError;
use crate::geometry::{normalize, WorldBounds};
use crate::registry::Registry;

/// World limits the executor enforces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionLimits {
    pub bounds: WorldBounds,
    /// Longest ray an attack may cast, in grid cells.
    pub max_attack_steps: u32,
}

impl Default for ActionLimits {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            max_attack_steps: 100,
        }
    }
}

/// Apply `action` to the machine `machine_id`.
pub fn execute(
    registry: &mut Registry,
    limits: &ActionLimits,
    machine_id: &str,
    action: &Action,
) -> Result<ActionOutcome, WorldError> {
    let machine = registry
        .machine(machine_id)
        .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
    if !machine.is_active() {
        return Err(WorldError::NotActive {
            id: machine_id.to_string(),
            status: machine.status,
        });
    }

    match action {
        Action::Move {
            direction,
            distance,
        } => move_machine(registry, limits, machine_id, *direction, *distance),
        Action::Attack { damage } => attack(registry, limits, machine_id, *damage),
        Action::Turn { direction } => turn(registry, machine_id, *direction),
    }
}

fn move_machine(
    registry: &mut Registry,
    limits: &ActionLimits,
    machine_id: &str,
    direction: [f64; 3],
    distance: f64,
) -> Result<ActionOutcome, WorldError> {
    let unit = normalize(direction).ok_or(WorldError::InvalidDirection)?;
    if !distance.is_finite() || distance < 0.0 {
        return Err(WorldError::invalid_spec(
            "distance",
            format!("{distance} must be finite and >= 0"),
        ));
    }

    let machine = registry
        .machine(machine_id)
        .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
    // A purely vertical move keeps the current heading.
    let facing = Facing::from_vector(unit[0], unit[1]).unwrap_or(machine.facing_direction);

    if distance == 0.0 {
        let machine = registry
            .machine_mut(machine_id)
            .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
        machine.facing_direction = facing;
        return Ok(ActionOutcome::FacingUpdated {
            facing_direction: facing,
        });
    }

    let candidate = machine.position.offset(
        unit[0] * distance,
        unit[1] * distance,
        unit[2] * distance,
    );
    if !limits.bounds.contains(&candidate) {
        return Err(WorldError::OutOfBounds(candidate));
    }
    let hits = find_collision_details(registry, &candidate, machine.size, Some(machine_id));
    if !hits.is_empty() {
        return Err(WorldError::Collision {
            position: candidate,
            hits,
        });
    }

    let machine = registry
        .machine_mut(machine_id)
        .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
    machine.position = candidate;
    machine.facing_direction = facing;
    machine.last_action = Some(format!("moved_to_{candidate}"));
    Ok(ActionOutcome::Moved {
        new_position: candidate,
        facing_direction: facing,
    })
}

fn attack(
    registry: &mut Registry,
    limits: &ActionLimits,
    machine_id: &str,
    damage: i64,
) -> Result<ActionOutcome, WorldError> {
    if damage < 0 {
        return Err(WorldError::invalid_spec(
            "damage",
            format!("{damage} must be >= 0"),
        ));
    }
    let attacker = registry
        .machine(machine_id)
        .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
    let (origin, facing) = (attacker.position, attacker.facing_direction);

    let (laser_path, target) = cast_ray(registry, limits, machine_id, origin, facing);

    let mut dealt = 0;
    let hit_result = match target {
        RayTarget::Nothing => HitResult::None,
        RayTarget::Obstacle(obstacle_id) => HitResult::Obstacle { obstacle_id },
        RayTarget::Machine(target_id) => {
            let target = registry
                .machine_mut(&target_id)
                .ok_or_else(|| WorldError::machine_not_found(target_id.as_str()))?;
            target.life_value = target.life_value.saturating_sub(damage);
            dealt = damage;
            let destroyed = target.life_value <= 0;
            if destroyed {
                target.status = MachineStatus::Destroyed;
                tracing::info!(
                    target: "grid_world::engine",
                    attacker = machine_id,
                    machine_id = %target_id,
                    "machine.destroyed"
                );
            }
            HitResult::Machine {
                machine_id: target_id,
                destroyed,
            }
        }
    };

    let attacker = registry
        .machine_mut(machine_id)
        .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
    attacker.last_action = Some(format!("attack_{hit_result}"));

    Ok(ActionOutcome::Attacked(AttackOutcome {
        laser_path,
        hit_result,
        damage: dealt,
    }))
}

enum RayTarget {
    Nothing,
    Obstacle(String),
    Machine(String),
}

/// March one cell at a time from `origin` along `facing`. The path always
/// begins with the origin cell and ends at the first hit, the step limit or
/// the last in-bounds cell.
fn cast_ray(
    registry: &Registry,
    limits: &ActionLimits,
    shooter: &str,
    origin: Position,
    facing: Facing,
) -> (Vec<LaserCell>, RayTarget) {
    let (start_x, start_y) = origin.cell();
    let mut path = vec![LaserCell {
        x: start_x,
        y: start_y,
    }];

    for step in 1..=limits.max_attack_steps {
        let distance = f64::from(step);
        let x = (origin.x() + facing.x() * distance).round() as i64;
        let y = (origin.y() + facing.y() * distance).round() as i64;
        if !limits.bounds.contains_cell(x, y) {
            break;
        }
        path.push(LaserCell { x, y });

        if let Some(obstacle) = registry.obstacle_at_cell(x, y) {
            return (path, RayTarget::Obstacle(obstacle.obstacle_id.clone()));
        }
        if let Some(machine) = registry.active_machine_at_cell(x, y, Some(shooter)) {
            return (path, RayTarget::Machine(machine.machine_id.clone()));
        }
    }

    (path, RayTarget::Nothing)
}

fn turn(
    registry: &mut Registry,
    machine_id: &str,
    direction: [f64; 2],
) -> Result<ActionOutcome, WorldError> {
    let facing =
        Facing::from_vector(direction[0], direction[1]).map_err(|_| WorldError::InvalidDirection)?;
    let machine = registry
        .machine_mut(machine_id)
        .ok_or_else(|| WorldError::machine_not_found(machine_id))?;
    machine.facing_direction = facing;
    machine.last_action = Some(format!("turned_to_{facing}"));
    Ok(ActionOutcome::Turned {
        facing_direction: facing,
    })
}

#[cfg(test)]
mod tests {
    use world_schema::{MachineState, ObstacleState};

    use super::*;

    fn machine(id: &str, x: f64, y: f64, life_value: i64) -> MachineState {
        MachineState {
            machine_id: id.to_string(),
            position: Position::planar(x, y),
            life_value,
            machine_type: "worker".to_string(),
            owner: String::new(),
            status: MachineStatus::Active,
            last_action: None,
            size: 1.0,
            facing_direction: Facing::EAST,
            view_size: 3,
        }
    }

    fn run(registry: &mut Registry, id: &str, action: Action) -> Result<ActionOutcome, WorldError> {
        execute(registry, &ActionLimits::default(), id, &action)
    }

    #[test]
    fn move_commits_rounded_position_and_facing() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 10));

        let outcome = run(&mut registry, "m1", Action::move_towards([0.0, 2.0, 0.0], 3.0)).unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Moved {
                new_position: Position::planar(0.0, 3.0),
                facing_direction: Facing::from_vector(0.0, 1.0).unwrap(),
            }
        );
        let stored = registry.machine("m1").unwrap();
        assert_eq!(stored.position, Position::planar(0.0, 3.0));
        assert_eq!(stored.last_action.as_deref(), Some("moved_to_(0, 3, 0)"));
    }

    #[test]
    fn zero_distance_only_turns() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 4.0, 4.0, 10));

        let outcome = run(&mut registry, "m1", Action::move_towards([-1.0, 0.0, 0.0], 0.0)).unwrap();
        assert!(matches!(outcome, ActionOutcome::FacingUpdated { .. }));
        let stored = registry.machine("m1").unwrap();
        assert_eq!(stored.position, Position::planar(4.0, 4.0));
        assert_eq!(stored.facing_direction.to_array(), [-1.0, 0.0]);
    }

    #[test]
    fn rejected_moves_leave_state_untouched() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 10));
        registry.insert_obstacle(ObstacleState::new("rock", Position::planar(0.0, 2.0)));
        let before = registry.machine("m1").cloned();

        let err = run(&mut registry, "m1", Action::move_towards([0.0, 1.0, 0.0], 2.0)).unwrap_err();
        assert!(matches!(err, WorldError::Collision { ref hits, .. } if hits.len() == 1));

        let err = run(&mut registry, "m1", Action::move_towards([1.0, 0.0, 0.0], 500.0)).unwrap_err();
        assert!(matches!(err, WorldError::OutOfBounds(_)));

        let err = run(&mut registry, "m1", Action::move_towards([0.0, 0.0, 0.0], 1.0)).unwrap_err();
        assert!(matches!(err, WorldError::InvalidDirection));

        assert_eq!(registry.machine("m1").cloned(), before);
    }

    #[test]
    fn vertical_move_keeps_heading() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 10));
        run(&mut registry, "m1", Action::move_towards([0.0, 0.0, 1.0], 2.0)).unwrap();
        let stored = registry.machine("m1").unwrap();
        assert_eq!(stored.position, Position::new(0.0, 0.0, 2.0));
        assert_eq!(stored.facing_direction, Facing::EAST);
    }

    #[test]
    fn attack_stops_at_first_obstacle() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 10));
        registry.insert_machine(machine("m2", 4.0, 0.0, 10));
        registry.insert_obstacle(ObstacleState::new("o1", Position::planar(2.0, 0.0)));

        let ActionOutcome::Attacked(outcome) = run(&mut registry, "m1", Action::attack(1)).unwrap()
        else {
            panic!("expected attack outcome");
        };
        assert_eq!(
            outcome.hit_result,
            HitResult::Obstacle {
                obstacle_id: "o1".to_string()
            }
        );
        assert_eq!(outcome.laser_path.len(), 3);
        assert_eq!(outcome.damage, 0);
        assert_eq!(registry.machine("m2").unwrap().life_value, 10);
        assert_eq!(
            registry.machine("m1").unwrap().last_action.as_deref(),
            Some("attack_hit_obstacle_o1")
        );
    }

    #[test]
    fn attack_damages_then_destroys() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 10));
        registry.insert_machine(machine("m2", 5.0, 0.0, 2));

        let first = run(&mut registry, "m1", Action::attack(1)).unwrap();
        assert!(matches!(
            first,
            ActionOutcome::Attacked(AttackOutcome {
                hit_result: HitResult::Machine { destroyed: false, .. },
                damage: 1,
                ..
            })
        ));
        run(&mut registry, "m1", Action::attack(1)).unwrap();
        let target = registry.machine("m2").unwrap();
        assert_eq!(target.life_value, 0);
        assert_eq!(target.status, MachineStatus::Destroyed);

        let err = run(&mut registry, "m2", Action::turn([0.0, 1.0])).unwrap_err();
        assert!(matches!(err, WorldError::NotActive { .. }));

        // The wreck no longer blocks the ray.
        let ActionOutcome::Attacked(outcome) = run(&mut registry, "m1", Action::attack(1)).unwrap()
        else {
            panic!("expected attack outcome");
        };
        assert_eq!(outcome.hit_result, HitResult::None);
        assert_eq!(outcome.laser_path.len(), 101);
    }

    #[test]
    fn attack_ray_stops_at_bounds() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 98.0, 0.0, 10));
        let limits = ActionLimits::default();
        let ActionOutcome::Attacked(outcome) =
            execute(&mut registry, &limits, "m1", &Action::attack(1)).unwrap()
        else {
            panic!("expected attack outcome");
        };
        assert_eq!(
            outcome.laser_path,
            vec![
                LaserCell { x: 98, y: 0 },
                LaserCell { x: 99, y: 0 },
                LaserCell { x: 100, y: 0 },
            ]
        );
    }

    #[test]
    fn turn_normalizes_and_rejects_zero() {
        let mut registry = Registry::new();
        registry.insert_machine(machine("m1", 0.0, 0.0, 10));
        run(&mut registry, "m1", Action::turn([0.0, -3.0])).unwrap();
        let stored = registry.machine("m1").unwrap();
        assert_eq!(stored.facing_direction.to_array(), [0.0, -1.0]);
        assert_eq!(stored.last_action.as_deref(), Some("turned_to_(0.000, -1.000)"));

        let err = run(&mut registry, "m1", Action::turn([0.0, 0.0])).unwrap_err();
        assert!(matches!(err, WorldError::InvalidDirection));
    }

    #[test]
    fn unknown_machine_is_not_found() {
        let mut registry = Registry::new();
        let err = run(&mut registry, "ghost", Action::attack(1)).unwrap_err();
        assert!(matches!(err, WorldError::NotFound { .. }));
    }
}
