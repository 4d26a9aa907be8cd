//! # Belief Filters Module
//!
//! Gaussian beliefs over the hidden target states. A belief never sees ground truth:
//! it is advanced by `predict` (time update) and fused with noisy range-bearing
//! measurements by `update`.
//!
//! ## Available Components
//!
//! - `BeliefFilter` trait: interface the environment drives once per step
//! - `KalmanBelief`: linear prediction with an extended (linearized) range-bearing update
//! - `UnscentedBelief`: sigma-point filter for the SE(2) target models

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::geometry::relative_distance_polar;
use crate::linalg::log_det;
use crate::map::OccupancyMap;
use crate::types::{Point2, Pose, SimRng};

pub mod kalman;
pub mod unscented;

pub use kalman::KalmanBelief;
pub use unscented::{Se2Model, UnscentedBelief};

/// Gaussian belief over one target's state
pub trait BeliefFilter: Send {
    /// Restart from `init_state` with covariance `init_cov * I`
    fn reset(&mut self, init_state: Array1<f64>, init_cov: f64);

    /// Time update
    fn predict(&mut self, rng: &mut SimRng) -> Result<()>;

    /// Fuse a `(range, bearing)` measurement taken from `agent`.
    ///
    /// A linearized filter whose mean coincides with the agent has no defined bearing
    /// gradient; it leaves the belief untouched and returns `Ok`. The environment still
    /// counts the target as observed for that step.
    fn update(&mut self, z: [f64; 2], agent: &Pose, map: &dyn OccupancyMap) -> Result<()>;

    fn state(&self) -> &Array1<f64>;

    fn cov(&self) -> &Array2<f64>;

    /// Natural log of `det(cov)`; fails when the covariance lost positive definiteness
    fn log_det_cov(&self) -> Result<f64> {
        log_det(self.cov())
    }

    fn position(&self) -> Point2 {
        let s = self.state();
        [s[0], s[1]]
    }
}

/// Expected measurement of a state whose first two entries are a position
pub(crate) fn measure(state: &Array1<f64>, agent: &Pose) -> [f64; 2] {
    let (r, alpha) = relative_distance_polar([state[0], state[1]], agent.xy(), agent.theta);
    [r, alpha]
}

/// Diagonal measurement noise for independent range and bearing errors
pub fn range_bearing_noise(range_sd: f64, bearing_sd: f64) -> Array2<f64> {
    let mut r = Array2::<f64>::zeros((2, 2));
    r[[0, 0]] = range_sd * range_sd;
    r[[1, 1]] = bearing_sd * bearing_sd;
    r
}
