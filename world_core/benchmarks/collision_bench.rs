use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use world_core::{
    check_collision, render_view, Action, MachineSpec, Position, WorldConfig, WorldEngine,
};

fn populated_engine(machines: usize) -> WorldEngine {
    let engine = WorldEngine::new(WorldConfig::default());
    let side = (machines as f64).sqrt().ceil() as usize;
    let mut placed = 0;
    'outer: for row in 0..side {
        for col in 0..side {
            if placed == machines {
                break 'outer;
            }
            let x = 20.0 + (col as f64) * 2.0;
            let y = 20.0 + (row as f64) * 2.0;
            if engine
                .register_machine(MachineSpec::new(format!("m{placed}"), [x, y]).view_size(9))
                .is_ok()
            {
                placed += 1;
            }
        }
    }
    engine
}

fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");

    for machines in [16usize, 256, 1024] {
        let engine = populated_engine(machines);
        let snapshot = engine.snapshot().expect("snapshot");
        let registry = world_core::Registry::from_snapshot(snapshot);
        let probe = Position::planar(-5.0, -5.0);

        group.bench_with_input(
            BenchmarkId::new("check", machines),
            &registry,
            |b, registry| b.iter(|| check_collision(registry, black_box(&probe), 1.0, None)),
        );
        group.bench_with_input(BenchmarkId::new("view", machines), &registry, |b, registry| {
            b.iter(|| render_view(registry, black_box("m0")))
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for machines in [16usize, 256] {
        group.bench_with_input(
            BenchmarkId::new("tick", machines),
            &machines,
            |b, &machines| {
                b.iter_batched(
                    || {
                        let engine = populated_engine(machines);
                        for machine in engine.machines() {
                            let _ = engine.submit_command(&machine.machine_id, Action::turn([0.0, 1.0]));
                        }
                        engine
                    },
                    |engine| engine.tick_once(),
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(collision_benches, bench_collision, bench_dispatch);
criterion_main!(collision_benches);
