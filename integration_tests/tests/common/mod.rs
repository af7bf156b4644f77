#![allow(dead_code)]

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use world_core::{MachineSpec, WorldConfig, WorldEngine};

/// Small open world: walls at ±15, no interior obstacles, queue capacity 4,
/// 5 ms polling.
pub fn test_config() -> WorldConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_world_config.json");
    WorldConfig::from_file(&path).expect("test world config")
}

pub fn engine() -> WorldEngine {
    WorldEngine::new(test_config())
}

pub fn machine(engine: &WorldEngine, id: &str, position: [f64; 3]) {
    engine
        .register_machine(MachineSpec::new(id, position))
        .unwrap_or_else(|err| panic!("register {id}: {err}"));
}

/// Poll `condition` until it holds or five seconds pass.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
