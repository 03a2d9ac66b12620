//! Tunable game constants.
//!
//! Every knob the simulation reads lives in [`GameConfig`]. The server builds
//! one from [`GameConfig::default`] and overlays command-line overrides; the
//! simulation never reads a global constant directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Colours handed out to new creatures.
pub const CREATURE_PALETTE: [u32; 8] = [
    0xff6b6b, 0x4ecdc4, 0x45b7d1, 0xf9ca24, 0xf0932b, 0xeb4d4b, 0x6c5ce7, 0xa29bfe,
];

/// Colours for ambient food orbs.
pub const FOOD_PALETTE: [u32; 12] = [
    0xff6b6b, 0x4ecdc4, 0x45b7d1, 0xf9ca24, 0xf0932b, 0xeb4d4b, 0x6c5ce7, 0xa29bfe, 0xfd79a8,
    0xfdcb6e, 0xe17055, 0x00b894,
];

/// Flat set of simulation tunables.
///
/// Distances are world units, speeds are world units per tick and
/// durations are milliseconds of simulation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Edge length of the square world `[0, world_size]`.
    pub world_size: f32,
    /// Ticks per second.
    pub tick_rate: u32,

    pub initial_length: usize,
    /// Distance between consecutive segments at spawn.
    pub segment_spacing: f32,
    pub base_speed: f32,
    pub boost_speed: f32,
    /// Per-tick chance of shedding a tail segment while boosting.
    pub boost_loss_probability: f32,
    /// Boost only costs length once the body exceeds `initial_length` by this much.
    pub boost_min_extra_length: usize,

    pub head_radius: f32,
    pub body_radius: f32,
    /// Smallest food size; actual orbs add a random jitter on top.
    pub food_size: f32,
    pub food_size_jitter: f32,
    pub death_food_size_jitter: f32,
    /// Death food is scattered up to this far from each source segment.
    pub death_food_spread: f32,

    pub target_food: usize,
    /// Hard cap on live food, death scattering included.
    pub max_food: usize,
    pub max_food_per_death: usize,
    /// Food never spawns closer than this to a world edge.
    pub food_edge_margin: f32,

    /// Spawn points are drawn from `[spawn_margin, world_size - spawn_margin]`.
    pub spawn_margin: f32,
    pub spawn_safety_radius: f32,
    pub spawn_attempts: usize,
    pub spawn_immunity_ms: u64,

    pub collision_tolerance: f32,
    /// Heads may leave the world by this much before the creature dies.
    pub boundary_margin: f32,
    /// Number of head-adjacent own segments ignored by self-collision.
    pub self_collision_exempt: usize,
    pub cell_size: f32,

    /// Heading changes smaller than this (radians) are ignored.
    pub min_heading_delta: f32,
    pub boost_toggle_interval_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            world_size: 4000.0,
            tick_rate: 30,
            initial_length: 5,
            segment_spacing: 20.0,
            base_speed: 3.0,
            boost_speed: 6.0,
            boost_loss_probability: 0.015,
            boost_min_extra_length: 3,
            head_radius: 12.0,
            body_radius: 10.0,
            food_size: 4.0,
            food_size_jitter: 3.0,
            death_food_size_jitter: 4.0,
            death_food_spread: 10.0,
            target_food: 800,
            max_food: 1600,
            max_food_per_death: 100,
            food_edge_margin: 50.0,
            spawn_margin: 200.0,
            spawn_safety_radius: 150.0,
            spawn_attempts: 50,
            spawn_immunity_ms: 3000,
            collision_tolerance: 2.0,
            boundary_margin: 30.0,
            self_collision_exempt: 8,
            cell_size: 100.0,
            min_heading_delta: 0.01,
            boost_toggle_interval_ms: 100,
        }
    }
}

impl GameConfig {
    /// Nominal wall time of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn spawn_immunity(&self) -> Duration {
        Duration::from_millis(self.spawn_immunity_ms)
    }

    pub fn boost_toggle_interval(&self) -> Duration {
        Duration::from_millis(self.boost_toggle_interval_ms)
    }

    /// Rejects geometry the simulation cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.world_size.is_finite() && self.world_size > 0.0) {
            return Err(format!(
                "world size must be a positive number, got {}",
                self.world_size
            ));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(format!(
                "cell size must be a positive number, got {}",
                self.cell_size
            ));
        }
        let margins = [
            ("spawn margin", self.spawn_margin),
            ("food edge margin", self.food_edge_margin),
        ];
        for (name, margin) in margins {
            if !(margin.is_finite() && margin >= 0.0) {
                return Err(format!("{} must be a non-negative number, got {}", name, margin));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_duration() {
        let config = GameConfig::default();
        assert_eq!(config.tick_duration().as_millis(), 33);
    }

    #[test]
    fn test_zero_tick_rate_does_not_divide_by_zero() {
        let config = GameConfig {
            tick_rate: 0,
            ..GameConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_cell_covers_largest_contact_distance() {
        // A 3x3 neighbourhood only finds contacts up to one cell away.
        let config = GameConfig::default();
        let widest_food = config.food_size + config.death_food_size_jitter;
        assert!(config.head_radius + widest_food <= config.cell_size);
        assert!(config.head_radius * 2.0 <= config.cell_size);
    }

    #[test]
    fn test_validate_rejects_bad_world_size() {
        assert!(GameConfig::default().validate().is_ok());

        for world_size in [0.0, -100.0, f32::NAN, f32::INFINITY] {
            let config = GameConfig {
                world_size,
                ..GameConfig::default()
            };
            assert!(config.validate().is_err(), "accepted {}", world_size);
        }
    }

    #[test]
    fn test_validate_rejects_nan_margin() {
        let config = GameConfig {
            spawn_margin: f32::NAN,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
