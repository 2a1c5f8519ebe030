//! Asteroid Swarm - spatial partitioning and collision core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (agents, spatial index, collisions, respawns)
//! - `settings`: Data-driven configuration
//! - `error`: Error types for configuration and index maintenance

pub mod error;
pub mod settings;
pub mod sim;

pub use error::{InvariantViolation, SimError};
pub use settings::{DistanceMode, IndexKind, Settings};

/// Default configuration constants
pub mod consts {
    /// Fixed simulation timestep used by the headless driver (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;

    /// World is a square grid `[0, WORLD_DIMENSION]` on both axes
    pub const WORLD_DIMENSION: f32 = 200.0;

    /// Collision radii per agent kind
    pub const ASTEROID_RADIUS: f32 = 0.2;
    pub const LASER_RADIUS: f32 = 0.07;
    pub const PLAYER_RADIUS: f32 = 0.2;

    /// Asteroid speed range (units/s) sampled through the speed lookup table
    pub const ASTEROID_SPEED_MIN: f32 = 0.54;
    pub const ASTEROID_SPEED_MAX: f32 = 1.2;

    /// Laser defaults
    pub const LASER_SPEED: f32 = 2.5;
    pub const LASER_LIFETIME: f32 = 2.0;
    pub const LASER_FIRE_INTERVAL: f32 = 0.5;
    pub const LASER_POOL: usize = 64;

    /// Countdown before a destroyed asteroid re-enters the simulation
    pub const RESPAWN_DELAY: f32 = 1.0;

    /// Half extents of the player's view, used to keep spawns off-screen
    pub const FRUSTUM_HALF_WIDTH: f32 = 6.0;
    pub const FRUSTUM_HALF_HEIGHT: f32 = 4.0;

    /// Quadtree defaults
    pub const MAX_PER_BUCKET: usize = 32;
    pub const INITIAL_PERMANENT_CAPACITY: usize = 16;
    pub const NODE_CAPACITY: usize = 4096;

    /// Grid hash defaults
    pub const GRID_CELL_SIZE: f32 = 2.0;
    pub const GRID_KEY_MULTIPLIER: i64 = 10_000;
}

/// Approximate square root working directly on the IEEE-754 representation.
///
/// Halves the exponent and adds the bias back in one integer pass. Roughly
/// 10-15% cheaper than a real square root; relative error peaks around 6%
/// (exact at even powers of two). The result is never below the true root
/// by more than rounding.
#[inline]
pub fn fast_sqrt(value: f32) -> f32 {
    if value <= 0.0 {
        return 0.0;
    }
    let mut bits = value.to_bits() as i32;
    bits -= 1 << 23;
    bits >>= 1;
    bits += 1 << 29;
    f32::from_bits(bits as u32)
}

/// Wrap a coordinate into `[0, extent)`
#[inline]
pub fn wrap_coord(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs
    if wrapped >= extent { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fast_sqrt_accuracy() {
        for &v in &[0.01f32, 0.16, 0.5, 1.0, 2.0, 9.0, 100.0, 12345.0] {
            let exact = v.sqrt();
            let approx = fast_sqrt(v);
            let err = (approx - exact).abs() / exact;
            assert!(err < 0.07, "fast_sqrt({v}) = {approx}, exact {exact}");
        }
        assert_eq!(fast_sqrt(0.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_fast_sqrt_never_undershoots(v in 1e-6f32..1e6) {
            prop_assert!(fast_sqrt(v) >= v.sqrt() * (1.0 - 1e-6));
        }
    }

    #[test]
    fn test_wrap_coord() {
        assert_eq!(wrap_coord(5.0, 10.0), 5.0);
        assert_eq!(wrap_coord(12.5, 10.0), 2.5);
        assert_eq!(wrap_coord(-2.5, 10.0), 7.5);
        assert!(wrap_coord(-1e-9, 10.0) < 10.0);
    }
}
