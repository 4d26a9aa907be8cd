//! Environment constants and their JSON persistence.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use crate::error::{Result, TrackError};

/// Every tunable constant shared by the tracking environments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Sensor maximum range (m)
    pub sensor_r: f64,
    /// Sensor field of view (degrees)
    pub fov: f64,
    /// Range noise standard deviation
    pub sensor_r_sd: f64,
    /// Bearing noise standard deviation
    pub sensor_b_sd: f64,
    /// Initial belief covariance, applied to the diagonal
    pub target_init_cov: f64,
    pub target_init_vel: [f64; 2],
    pub target_speed_limit: f64,
    /// Agent to belief linear distance range at reset
    pub lin_dist_range_a2b: (f64, f64),
    /// Agent to belief angular window (counter clockwise, radians)
    pub ang_dist_range_a2b: (f64, f64),
    /// Belief to target linear distance range at reset
    pub lin_dist_range_b2t: (f64, f64),
    pub ang_dist_range_b2t: (f64, f64),
    /// Minimum agent/target separation
    pub margin: f64,
    /// Minimum distance to a wall
    pub margin2wall: f64,
    /// Action primitives: linear velocities
    pub action_v: Vec<f64>,
    /// Action primitives: angular velocities
    pub action_w: Vec<f64>,
    /// Process noise constant assumed by the beliefs
    pub const_q: f64,
    /// Process noise constant of the true targets when the noise is unknown
    pub const_q_true: f64,
    /// Decision period (s)
    pub sampling_period: f64,
    /// Side of the square around a fixed path start where the belief is placed
    pub init_distance_belief: f64,
    /// Base of the visit-map decay, per sensor range travelled by the beliefs
    pub visit_decay_base: f64,
    pub reward: RewardWeights,
}

/// Weights of the reward terms
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub c_mean: f64,
    pub c_std: f64,
    pub c_observed: f64,
    pub c_penalty: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        RewardWeights {
            c_mean: 0.1,
            c_std: 0.1,
            c_observed: 0.1,
            c_penalty: 1.0,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            sensor_r: 10.0,
            fov: 120.0,
            sensor_r_sd: 0.2,
            sensor_b_sd: 0.01,
            target_init_cov: 30.0,
            target_init_vel: [0.0, 0.0],
            target_speed_limit: 1.0,
            lin_dist_range_a2b: (5.0, 10.0),
            ang_dist_range_a2b: (-PI, PI),
            lin_dist_range_b2t: (0.0, 10.0),
            ang_dist_range_b2t: (-PI, PI),
            margin: 1.0,
            margin2wall: 0.5,
            action_v: vec![3.0, 2.0, 1.0, 0.0],
            action_w: vec![PI / 2.0, 0.0, -PI / 2.0],
            const_q: 0.01,
            const_q_true: 0.01,
            sampling_period: 0.5,
            init_distance_belief: 5.0,
            visit_decay_base: 0.7,
            reward: RewardWeights::default(),
        }
    }
}

impl EnvConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: EnvConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Field of view in radians
    pub fn fov_rad(&self) -> f64 {
        self.fov.to_radians()
    }

    /// Largest relative speed between the agent and a target
    pub fn rel_speed_limit(&self) -> f64 {
        let v_max = self.action_v.iter().copied().fold(0.0, f64::max);
        self.target_speed_limit + v_max
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("sensor_r", self.sensor_r),
            ("fov", self.fov),
            ("target_init_cov", self.target_init_cov),
            ("sampling_period", self.sampling_period),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(TrackError::invalid_parameter(
                    name.to_string(),
                    format!("must be positive, got {}", value),
                ));
            }
        }
        for (name, range) in [
            ("lin_dist_range_a2b", self.lin_dist_range_a2b),
            ("lin_dist_range_b2t", self.lin_dist_range_b2t),
        ] {
            if range.0 < 0.0 || range.1 < range.0 {
                return Err(TrackError::invalid_parameter(
                    name.to_string(),
                    format!("expected 0 <= min <= max, got {:?}", range),
                ));
            }
        }
        if self.action_v.is_empty() || self.action_w.is_empty() {
            return Err(TrackError::invalid_parameter("action_v/action_w", "action tables must not be empty"));
        }
        if self.sensor_r_sd < 0.0 || self.sensor_b_sd < 0.0 {
            return Err(TrackError::invalid_parameter("sensor noise", "standard deviations must be non-negative"));
        }
        if !(self.visit_decay_base > 0.0 && self.visit_decay_base <= 1.0) {
            return Err(TrackError::invalid_parameter(
                "visit_decay_base".to_string(),
                format!("must lie in (0, 1], got {}", self.visit_decay_base),
            ));
        }
        Ok(())
    }
}
