//! Simulation settings
//!
//! Loaded once at startup (JSON file or defaults) and validated before the
//! simulation is built. Every field has a default, so partial files work.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::SimError;

/// Broad-phase strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IndexKind {
    /// Quadtree on a node arena, repaired incrementally every frame
    #[default]
    Quadtree,
    /// Uniform grid hash, rebuilt from scratch every frame
    Grid,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Quadtree => "Quadtree",
            IndexKind::Grid => "Grid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quadtree" | "quad" => Some(IndexKind::Quadtree),
            "grid" | "hash" => Some(IndexKind::Grid),
            _ => None,
        }
    }
}

/// How circle-circle distances are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMode {
    /// `Vec2::distance`
    #[default]
    Exact,
    /// Bit-trick square root (see [`crate::fast_sqrt`]), trades accuracy for
    /// speed. The approximation never undershoots, so it only drops borderline
    /// hits and the quadtree's exact-distance pruning stays conservative.
    Fast,
}

impl DistanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMode::Exact => "Exact",
            DistanceMode::Fast => "Fast",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(DistanceMode::Exact),
            "fast" | "approx" => Some(DistanceMode::Fast),
            _ => None,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// RNG seed for layout, respawn placement and directions
    pub seed: u64,

    // === World ===
    /// Side length of the square world
    pub world_dimension: f32,

    // === Agents ===
    pub asteroid_radius: f32,
    pub laser_radius: f32,
    pub player_radius: f32,
    /// Speed lookup table range (units/s)
    pub asteroid_speed_min: f32,
    pub asteroid_speed_max: f32,
    pub laser_speed: f32,
    /// Seconds a laser lives before it is retired to the pool
    pub laser_lifetime: f32,
    /// Minimum seconds between two shots
    pub laser_fire_interval: f32,
    /// Dead laser slots reserved in the store for firing
    pub laser_pool: usize,
    /// Countdown before a destroyed asteroid respawns
    pub respawn_delay: f32,

    // === Spawn placement ===
    pub frustum_half_width: f32,
    pub frustum_half_height: f32,

    // === Spatial index ===
    pub index: IndexKind,
    /// Movable agents a quadtree leaf holds before it subdivides
    pub max_per_bucket: usize,
    /// Starting capacity of every permanent table
    pub initial_permanent_capacity: usize,
    /// Maximum quadtree nodes
    pub node_capacity: usize,
    pub grid_cell_size: f32,
    pub grid_key_multiplier: i64,

    // === Collision ===
    pub distance: DistanceMode,
    /// Fork-join the quadtree's four top-level subtrees
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: 0,

            world_dimension: WORLD_DIMENSION,

            asteroid_radius: ASTEROID_RADIUS,
            laser_radius: LASER_RADIUS,
            player_radius: PLAYER_RADIUS,
            asteroid_speed_min: ASTEROID_SPEED_MIN,
            asteroid_speed_max: ASTEROID_SPEED_MAX,
            laser_speed: LASER_SPEED,
            laser_lifetime: LASER_LIFETIME,
            laser_fire_interval: LASER_FIRE_INTERVAL,
            laser_pool: LASER_POOL,
            respawn_delay: RESPAWN_DELAY,

            frustum_half_width: FRUSTUM_HALF_WIDTH,
            frustum_half_height: FRUSTUM_HALF_HEIGHT,

            index: IndexKind::Quadtree,
            max_per_bucket: MAX_PER_BUCKET,
            initial_permanent_capacity: INITIAL_PERMANENT_CAPACITY,
            node_capacity: NODE_CAPACITY,
            grid_cell_size: GRID_CELL_SIZE,
            grid_key_multiplier: GRID_KEY_MULTIPLIER,

            distance: DistanceMode::Exact,
            parallel: false,
        }
    }
}

impl Settings {
    /// Largest collision radius of any kind
    pub fn max_radius(&self) -> f32 {
        self.asteroid_radius
            .max(self.laser_radius)
            .max(self.player_radius)
    }

    /// Reject configurations the index or the respawn heuristic cannot handle
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: &str| Err(SimError::InvalidSettings(msg.to_string()));

        if !(self.world_dimension > 0.0 && self.world_dimension.is_finite()) {
            return invalid("world_dimension must be positive and finite");
        }
        if !(self.asteroid_radius > 0.0 && self.laser_radius > 0.0 && self.player_radius > 0.0) {
            return invalid("collision radii must be positive");
        }
        if self.asteroid_speed_min < 0.0 || self.asteroid_speed_max < self.asteroid_speed_min {
            return invalid("asteroid speed range must satisfy 0 <= min <= max");
        }
        if self.respawn_delay < 0.0 || self.laser_lifetime < 0.0 || self.laser_fire_interval < 0.0 {
            return invalid("timers must not be negative");
        }
        if self.max_per_bucket == 0 {
            return invalid("max_per_bucket must be at least 1");
        }
        if self.node_capacity < 5 {
            return invalid("node_capacity must fit the root and its four quadrants");
        }
        if !self.grid_cell_size.is_finite() || self.grid_cell_size < 2.0 * self.max_radius() {
            return invalid("grid_cell_size must be at least twice the largest radius");
        }
        // float to int casts saturate, the margin must too
        let columns =
            ((self.world_dimension / self.grid_cell_size).ceil() as i64).saturating_add(2);
        if self.grid_key_multiplier <= columns {
            return invalid("grid_key_multiplier must exceed the number of grid columns");
        }
        Ok(())
    }

    /// Parse settings from a JSON document (missing fields use defaults)
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!((settings.max_radius() - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json(r#"{ "seed": 7, "index": "Grid" }"#).unwrap();
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.index, IndexKind::Grid);
        assert_eq!(settings.max_per_bucket, MAX_PER_BUCKET);
    }

    #[test]
    fn test_rejects_small_grid_cells() {
        let settings = Settings {
            grid_cell_size: 0.3,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(SimError::InvalidSettings(_))));
    }

    #[test]
    fn test_rejects_key_multiplier_overflow() {
        let settings = Settings {
            world_dimension: 100_000.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_non_finite_sizes() {
        for world_dimension in [f32::INFINITY, f32::NAN, 1e30] {
            let settings = Settings {
                world_dimension,
                ..Default::default()
            };
            assert!(matches!(settings.validate(), Err(SimError::InvalidSettings(_))));
        }
        // 1e39 does not fit an f32 and parses to infinity
        assert!(Settings::from_json(r#"{ "world_dimension": 1e39 }"#).is_err());
        let settings = Settings {
            grid_cell_size: f32::INFINITY,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_enums() {
        let settings = Settings {
            distance: DistanceMode::Fast,
            parallel: true,
            ..Default::default()
        };
        let parsed = Settings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(parsed.distance, DistanceMode::Fast);
        assert!(parsed.parallel);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(IndexKind::from_str("GRID"), Some(IndexKind::Grid));
        assert_eq!(IndexKind::from_str("quad"), Some(IndexKind::Quadtree));
        assert_eq!(DistanceMode::from_str("approx"), Some(DistanceMode::Fast));
        assert_eq!(DistanceMode::from_str("nope"), None);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Settings::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
