//! Simulation configuration.
//!
//! Every tunable the driver reads lives here so a host can load a single
//! JSON document at setup. Missing fields fall back to `Default`.

use crate::error::{Result, SimError};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration resource for the combat simulation.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Number of unit slots in the pool.
    pub pool_capacity: usize,
    /// Seconds a dead unit keeps its slot before reclamation.
    pub decay_delay: f32,
    /// Spatial index cell size in world units.
    pub spatial_cell_size: f32,
    /// Flow-field cell size in world units.
    pub flow_cell_size: f32,
    /// Flow window extent behind the camera.
    pub flow_window_behind: f32,
    /// Flow window extent ahead of the camera.
    pub flow_window_ahead: f32,
    /// Camera shift (in flow cells) that forces a recompute.
    pub flow_recompute_shift: i32,
    /// Lane bounds on the y axis.
    pub lane_min_y: f32,
    pub lane_max_y: f32,
    /// Width of one battlefield chunk (stage).
    pub chunk_width: f32,
    /// Distance ahead of the camera that must already be generated.
    pub look_ahead: f32,
    /// Chunks more than this many stages behind the camera are culled.
    pub cull_behind_stages: u32,
    /// Camera lead ahead of the furthest friendly unit.
    pub camera_lead: f32,
    /// Exponential approach rate of the camera (1/s).
    pub camera_smoothing: f32,
    /// Minimum gap the camera keeps from an undestroyed wall ahead.
    pub wall_clamp_margin: f32,
    /// Seconds between target re-acquisitions per unit.
    pub retarget_interval: f32,
    /// Maximum combat requests processed per drain.
    pub request_budget: usize,
    /// Seed for the simulation RNG.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            pool_capacity: 512,
            decay_delay: 1.5,
            spatial_cell_size: 64.0,
            flow_cell_size: 16.0,
            flow_window_behind: 320.0,
            flow_window_ahead: 960.0,
            flow_recompute_shift: 4,
            lane_min_y: 0.0,
            lane_max_y: 320.0,
            chunk_width: 640.0,
            look_ahead: 960.0,
            cull_behind_stages: 2,
            camera_lead: 200.0,
            camera_smoothing: 3.0,
            wall_clamp_margin: 40.0,
            retarget_interval: 0.25,
            request_budget: 4096,
            seed: 0x5eed,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fixed_timestep <= 0.0 {
            return Err(SimError::InvalidConfig("fixed_timestep must be positive".into()));
        }
        if self.pool_capacity == 0 {
            return Err(SimError::InvalidConfig("pool_capacity must be non-zero".into()));
        }
        if self.spatial_cell_size <= 0.0 || self.flow_cell_size <= 0.0 {
            return Err(SimError::InvalidConfig("cell sizes must be positive".into()));
        }
        if self.chunk_width <= 0.0 {
            return Err(SimError::InvalidConfig("chunk_width must be positive".into()));
        }
        if self.lane_max_y <= self.lane_min_y {
            return Err(SimError::InvalidConfig("lane_max_y must exceed lane_min_y".into()));
        }
        if self.request_budget == 0 {
            return Err(SimError::InvalidConfig("request_budget must be non-zero".into()));
        }
        Ok(())
    }

    /// Height of the lane in world units.
    pub fn lane_height(&self) -> f32 {
        self.lane_max_y - self.lane_min_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(r#"{ "pool_capacity": 64, "seed": 7 }"#).unwrap();
        assert_eq!(config.pool_capacity, 64);
        assert_eq!(config.seed, 7);
        assert_eq!(config.chunk_width, SimConfig::default().chunk_width);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = SimConfig::from_json_str(r#"{ "pool_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = SimConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SimError::SerdeError(_)));
    }
}
