mod common;

use std::sync::Arc;
use std::thread;

use world_core::{Action, MachineSpec, Position, WorldError};

#[test]
fn queue_rejects_submission_past_capacity() {
    let engine = common::engine();
    common::machine(&engine, "M1", [0.0, 0.0, 0.0]);
    let capacity = engine.config().queue_capacity;

    for expected_depth in 1..=capacity {
        let outcome = engine.submit_command("M1", Action::attack(1)).unwrap();
        assert_eq!(outcome.queue_depth, expected_depth);
    }
    let err = engine.submit_command("M1", Action::attack(1)).unwrap_err();
    assert!(matches!(err, WorldError::QueueFull(ref id) if id == "M1"));
    assert_eq!(engine.pending_commands("M1"), capacity);

    engine.tick_once().unwrap();
    assert!(engine.submit_command("M1", Action::attack(1)).is_ok());
}

#[test]
fn commands_for_one_machine_run_in_order() {
    let engine = common::engine();
    common::machine(&engine, "M1", [0.0, 0.0, 0.0]);

    engine
        .submit_command("M1", Action::move_towards([1.0, 0.0, 0.0], 2.0))
        .unwrap();
    engine
        .submit_command("M1", Action::move_towards([0.0, 1.0, 0.0], 2.0))
        .unwrap();
    engine.submit_command("M1", Action::turn([-1.0, 0.0])).unwrap();

    engine.tick_once().unwrap();
    assert_eq!(engine.machine("M1").unwrap().position, Position::planar(2.0, 0.0));
    engine.tick_once().unwrap();
    assert_eq!(engine.machine("M1").unwrap().position, Position::planar(2.0, 2.0));
    engine.tick_once().unwrap();
    assert_eq!(
        engine.machine("M1").unwrap().facing_direction.to_array(),
        [-1.0, 0.0]
    );
}

#[test]
fn ticks_are_round_robin_across_machines() {
    let engine = common::engine();
    common::machine(&engine, "A", [0.0, 0.0, 0.0]);
    common::machine(&engine, "B", [0.0, 5.0, 0.0]);
    for _ in 0..3 {
        engine.submit_command("A", Action::turn([0.0, 1.0])).unwrap();
    }
    engine.submit_command("B", Action::turn([0.0, 1.0])).unwrap();

    let report = engine.tick_once().unwrap();
    assert_eq!(report.dequeued, 2);
    assert_eq!(engine.pending_commands("A"), 2);
    assert_eq!(engine.pending_commands("B"), 0);
}

#[test]
fn failed_commands_are_logged_and_skipped() {
    let engine = common::engine();
    common::machine(&engine, "M1", [0.0, 0.0, 0.0]);
    engine
        .submit_command("M1", Action::move_towards([1.0, 0.0, 0.0], 60.0))
        .unwrap();
    engine
        .submit_command("M1", Action::move_towards([0.0, 0.0, 0.0], 1.0))
        .unwrap();
    engine
        .submit_command("M1", Action::move_towards([1.0, 0.0, 0.0], 1.0))
        .unwrap();

    assert_eq!(engine.drain(10), 3);
    assert_eq!(engine.machine("M1").unwrap().position, Position::planar(1.0, 0.0));
    let stats = engine.dispatch_stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.executed, 1);
}

#[test]
fn background_loop_drains_and_restarts() {
    let engine = common::engine();
    common::machine(&engine, "M1", [0.0, 0.0, 0.0]);

    assert!(engine.start());
    assert!(engine.tick_once().is_none());
    engine
        .submit_command("M1", Action::move_towards([1.0, 0.0, 0.0], 1.0))
        .unwrap();
    assert!(common::wait_for(|| {
        engine.machine("M1").map(|m| m.position) == Some(Position::planar(1.0, 0.0))
    }));
    assert!(engine.stop());

    // Queued while stopped: nothing runs until the loop is back.
    engine
        .submit_command("M1", Action::move_towards([1.0, 0.0, 0.0], 1.0))
        .unwrap();
    thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(engine.pending_commands("M1"), 1);
    assert_eq!(engine.machine("M1").unwrap().position, Position::planar(1.0, 0.0));

    assert!(engine.start());
    assert!(common::wait_for(|| engine.pending_commands("M1") == 0
        && engine.machine("M1").map(|m| m.position) == Some(Position::planar(2.0, 0.0))));
    assert!(engine.stop());
}

#[test]
fn concurrent_producers_respect_capacity() {
    let engine = Arc::new(common::engine());
    engine
        .register_machine(MachineSpec::new("M1", [0.0, 0.0, 0.0]))
        .unwrap();
    let capacity = engine.config().queue_capacity;

    let producers: Vec<_> = (0..6)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..10)
                    .map(|_| engine.submit_command("M1", Action::turn([0.0, 1.0])))
                    .filter(Result::is_ok)
                    .count()
            })
        })
        .collect();
    let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();

    assert_eq!(accepted, capacity);
    assert_eq!(engine.pending_commands("M1"), capacity);
    assert_eq!(engine.drain(100), capacity);
}
