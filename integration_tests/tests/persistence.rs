mod common;

use std::sync::Arc;

use tempfile::tempdir;
use world_core::{
    Action, BincodeFileStorage, JsonFileStorage, MachineSpec, ObstacleSpec, Position,
    WorldConfig, WorldEngine, WorldStorage,
};

#[test]
fn reset_restores_the_same_layout() {
    let config = WorldConfig::default();
    let engine = WorldEngine::new(config.clone());
    let initial = engine.obstacles();

    engine.register_machine(MachineSpec::new("M1", [0.0, 0.0])).unwrap();
    engine.submit_command("M1", Action::attack(1)).unwrap();
    engine.register_obstacle(ObstacleSpec::new("extra", [1.0, 2.0])).unwrap();
    engine.remove_obstacle("wall_top_0").unwrap();

    let summary = engine.reset();
    assert_eq!(summary.machines_removed, 1);
    assert_eq!(summary.commands_discarded, 1);
    assert_eq!(summary.obstacles_seeded, initial.len());
    assert!(engine.machines().is_empty());
    assert!(engine.queue_depths().is_empty());
    assert_eq!(engine.obstacles(), initial);

    let other = WorldEngine::new(config);
    assert_eq!(other.obstacles(), initial);
}

fn populate(engine: &WorldEngine) {
    engine
        .register_machine(
            MachineSpec::new("M1", [1.0, 1.0])
                .owner("alice")
                .machine_type("scout")
                .view_size(6),
        )
        .unwrap();
    engine
        .register_machine(MachineSpec::new("M2", [4.0, 1.0]).life_value(1))
        .unwrap();
    engine.execute_now("M1", &Action::attack(3)).unwrap();
}

fn assert_round_trip(storage: Arc<dyn WorldStorage>) {
    let original = WorldEngine::with_storage(common::test_config(), Arc::clone(&storage));
    populate(&original);
    original.submit_command("M1", Action::turn([0.0, 1.0])).unwrap();
    let header = original.save().unwrap();
    assert_eq!(header.machine_count, 2);
    let machines = original.machines();
    let obstacles = original.obstacles();
    drop(original);

    let restored = WorldEngine::with_storage(common::test_config(), storage);
    assert_eq!(restored.machines(), machines);
    assert_eq!(restored.obstacles(), obstacles);
    assert_eq!(restored.machine("M1").unwrap().view_size, 7);
    assert!(!restored.machine("M2").unwrap().is_active());

    // Pending commands are not persisted but every machine has a queue again.
    assert_eq!(restored.pending_commands("M1"), 0);
    restored
        .submit_command("M1", Action::move_towards([0.0, 1.0, 0.0], 1.0))
        .unwrap();
    restored.tick_once().unwrap();
    assert_eq!(restored.machine("M1").unwrap().position, Position::planar(1.0, 2.0));
}

#[test]
fn json_storage_round_trip() {
    let dir = tempdir().unwrap();
    assert_round_trip(Arc::new(JsonFileStorage::new(dir.path().join("world_state.json"))));
}

#[test]
fn bincode_storage_round_trip() {
    let dir = tempdir().unwrap();
    assert_round_trip(Arc::new(BincodeFileStorage::new(dir.path().join("world_state.bin"))));
}

#[test]
fn load_replaces_current_world() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(JsonFileStorage::new(dir.path().join("world.json")));
    let engine = WorldEngine::with_storage(common::test_config(), storage);
    populate(&engine);
    engine.save().unwrap();

    engine.remove_machine("M2").unwrap();
    engine.register_machine(MachineSpec::new("M9", [-5.0, -5.0])).unwrap();
    assert!(engine.load().unwrap());

    let ids: Vec<String> = engine.machines().into_iter().map(|m| m.machine_id).collect();
    assert_eq!(ids, vec!["M1".to_string(), "M2".to_string()]);
    assert_eq!(engine.pending_commands("M9"), 0);
    assert!(engine.submit_command("M9", Action::attack(1)).is_err());
}

#[test]
fn unreadable_snapshot_falls_back_to_default_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("world.json");
    std::fs::write(&path, "not a snapshot").unwrap();

    let engine =
        WorldEngine::with_storage(common::test_config(), Arc::new(JsonFileStorage::new(&path)));
    assert!(engine.machines().is_empty());
    assert_eq!(engine.obstacles().len(), 31 * 4);
}

#[test]
fn owner_visibility_filters_foreign_machines() {
    let engine = common::engine();
    populate(&engine);
    engine
        .register_machine(MachineSpec::new("far", [-10.0, -10.0]).owner("bob"))
        .unwrap();

    let visibility = engine.visible_to_owner("alice");
    let owned: Vec<&str> = visibility.owned.iter().map(|m| m.machine_id.as_str()).collect();
    let seen: Vec<&str> = visibility.machines.iter().map(|m| m.machine_id.as_str()).collect();
    assert_eq!(owned, vec!["M1"]);
    assert_eq!(seen, vec!["M2"]);
    assert!(visibility.obstacles.is_empty());
}
