//! Range-bearing sensor with a limited field of view and line-of-sight occlusion.

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::belief::range_bearing_noise;
use crate::config::EnvConfig;
use crate::error::{Result, TrackError};
use crate::geometry::relative_distance_polar;
use crate::map::OccupancyMap;
use crate::types::{Observation, Point2, Pose};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sensor {
    /// Maximum detection range
    pub range: f64,
    /// Full field of view in radians
    pub fov: f64,
    pub range_sd: f64,
    pub bearing_sd: f64,
}

impl Sensor {
    pub fn from_config(config: &EnvConfig) -> Self {
        Sensor {
            range: config.sensor_r,
            fov: config.fov_rad(),
            range_sd: config.sensor_r_sd,
            bearing_sd: config.sensor_b_sd,
        }
    }

    /// Covariance of the additive measurement noise
    pub fn noise_cov(&self) -> Array2<f64> {
        range_bearing_noise(self.range_sd, self.bearing_sd)
    }

    /// True `(range, bearing)` of a target the sensor can currently see
    pub fn in_view(&self, agent: &Pose, target: Point2, map: &dyn OccupancyMap) -> Option<(f64, f64)> {
        let (r, alpha) = relative_distance_polar(target, agent.xy(), agent.theta);
        let visible = r <= self.range && alpha.abs() <= self.fov / 2.0 && !map.is_blocked(agent.xy(), target);
        visible.then_some((r, alpha))
    }

    pub fn observe<R: Rng + ?Sized>(
        &self,
        agent: &Pose,
        target: Point2,
        map: &dyn OccupancyMap,
        rng: &mut R,
    ) -> Result<Observation> {
        Ok(match self.in_view(agent, target, map) {
            None => Observation::missed(),
            Some((r, alpha)) => Observation {
                detected: true,
                measurement: Some([r + gaussian(self.range_sd, rng)?, alpha + gaussian(self.bearing_sd, rng)?]),
            },
        })
    }
}

fn gaussian<R: Rng + ?Sized>(sd: f64, rng: &mut R) -> Result<f64> {
    let normal = Normal::new(0.0, sd)
        .map_err(|e| TrackError::invalid_parameter("sensor noise deviation".to_string(), format!("{sd}: {e}")))?;
    Ok(normal.sample(rng))
}
