//! Spatial helpers shared by collision checks, actions and views.

use serde::{Deserialize, Serialize};
use world_schema::Position;

/// Inclusive `[min, max]` range applied to every axis of the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min: -100.0,
            max: 100.0,
        }
    }
}

impl WorldBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, position: &Position) -> bool {
        position.is_within_bounds(self.min, self.max)
    }

    /// Horizontal-plane check used by the attack ray.
    pub fn contains_cell(&self, x: i64, y: i64) -> bool {
        let range = self.min..=self.max;
        range.contains(&(x as f64)) && range.contains(&(y as f64))
    }
}

/// Scale `vector` to unit length. Returns `None` for zero-length or
/// non-finite input.
pub fn normalize(vector: [f64; 3]) -> Option<[f64; 3]> {
    let [x, y, z] = vector;
    let length = (x * x + y * y + z * z).sqrt();
    if length == 0.0 || !length.is_finite() {
        return None;
    }
    Some([x / length, y / length, z / length])
}

/// Two circular bodies overlap when their centres are closer than half the
/// larger radius. Exact tangency is allowed.
pub fn bodies_overlap(a: &Position, size_a: f64, b: &Position, size_b: f64) -> bool {
    a.distance_to(b) < size_a.max(size_b) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_zero() {
        assert_eq!(normalize([0.0, 0.0, 0.0]), None);
        assert_eq!(normalize([0.0, 2.0, 0.0]), Some([0.0, 1.0, 0.0]));
    }

    #[test]
    fn tangent_bodies_do_not_overlap() {
        let origin = Position::planar(0.0, 0.0);
        assert!(bodies_overlap(&origin, 1.0, &origin, 1.0));
        // distance 1 vs threshold 2 * 0.5
        assert!(!bodies_overlap(&origin, 2.0, &Position::planar(1.0, 0.0), 1.0));
        assert!(bodies_overlap(&origin, 3.0, &Position::planar(1.0, 0.0), 1.0));
    }

    #[test]
    fn bounds_are_inclusive() {
        let bounds = WorldBounds::new(-5.0, 5.0);
        assert!(bounds.contains(&Position::new(5.0, -5.0, 0.0)));
        assert!(!bounds.contains(&Position::new(6.0, 0.0, 0.0)));
        assert!(bounds.contains_cell(-5, 5));
        assert!(!bounds.contains_cell(0, -6));
    }
}
