//! Default obstacle layout restored by construction and reset.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use world_schema::{ObstacleState, Position};

use crate::config::LayoutConfig;

/// Half-width of the central square kept clear of interior obstacles.
const SPAWN_CLEARANCE: i64 = 3;

/// Perimeter walls at `±wall_size` followed by seeded interior obstacles.
/// The same config always yields the same list.
pub fn default_obstacles(layout: &LayoutConfig) -> Vec<ObstacleState> {
    let w = layout.wall_size;
    let mut obstacles = Vec::new();

    for i in -w..=w {
        let i_f = i as f64;
        let w_f = w as f64;
        obstacles.push(ObstacleState::new(
            format!("wall_top_{i}"),
            Position::planar(i_f, w_f),
        ));
        obstacles.push(ObstacleState::new(
            format!("wall_bottom_{i}"),
            Position::planar(i_f, -w_f),
        ));
        obstacles.push(ObstacleState::new(
            format!("wall_left_{i}"),
            Position::planar(-w_f, i_f),
        ));
        obstacles.push(ObstacleState::new(
            format!("wall_right_{i}"),
            Position::planar(w_f, i_f),
        ));
    }

    let reach = w - SPAWN_CLEARANCE;
    if reach <= SPAWN_CLEARANCE {
        if layout.interior_obstacle_count > 0 {
            tracing::debug!(
                target: "grid_world::engine",
                wall_size = w,
                "layout.interior_skipped"
            );
        }
        return obstacles;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(layout.seed);
    for index in 0..layout.interior_obstacle_count {
        let (x, y) = loop {
            let x = rng.gen_range(-reach..=reach);
            let y = rng.gen_range(-reach..=reach);
            if x.abs() > SPAWN_CLEARANCE || y.abs() > SPAWN_CLEARANCE {
                break (x, y);
            }
        };
        obstacles.push(ObstacleState::new(
            format!("inner_{index}"),
            Position::planar(x as f64, y as f64),
        ));
    }
    obstacles
}
