use ndarray::{Array1, Array2};

use super::{measure, BeliefFilter};
use crate::error::{Result, TrackError};
use crate::geometry::wrap_around;
use crate::linalg::{inverse, symmetrize};
use crate::map::OccupancyMap;
use crate::types::{Pose, SimRng, StateLimits};

/// Kalman belief for linear target models.
///
/// Prediction is exact (`x' = A x`, `P' = A P A^T + W`); the range-bearing update
/// is linearized around the current mean and applied in Joseph form.
pub struct KalmanBelief {
    a: Array2<f64>,
    w: Array2<f64>,
    obs_noise: Array2<f64>,
    limits: StateLimits,
    state: Array1<f64>,
    cov: Array2<f64>,
}

impl KalmanBelief {
    pub fn new(a: Array2<f64>, w: Array2<f64>, obs_noise: Array2<f64>, limits: StateLimits) -> Result<Self> {
        let dim = limits.dim();
        if a.dim() != (dim, dim) || w.dim() != (dim, dim) {
            return Err(TrackError::dimension_mismatch(
                format!("{dim}x{dim} transition and noise"),
                format!("{:?} and {:?}", a.dim(), w.dim()),
            ));
        }
        if dim < 2 {
            return Err(TrackError::invalid_parameter("dim", "a belief state starts with a 2-D position"));
        }
        Ok(KalmanBelief {
            a,
            w,
            obs_noise,
            limits,
            state: Array1::zeros(dim),
            cov: Array2::eye(dim),
        })
    }

    /// Jacobian of `(range, bearing)` with respect to the state
    fn jacobian(&self, agent: &Pose) -> Option<Array2<f64>> {
        let dx = self.state[0] - agent.x;
        let dy = self.state[1] - agent.y;
        let r2 = dx * dx + dy * dy;
        if r2 < 1e-12 {
            return None;
        }
        let r = r2.sqrt();
        let mut h = Array2::<f64>::zeros((2, self.state.len()));
        h[[0, 0]] = dx / r;
        h[[0, 1]] = dy / r;
        h[[1, 0]] = -dy / r2;
        h[[1, 1]] = dx / r2;
        Some(h)
    }
}

impl BeliefFilter for KalmanBelief {
    fn reset(&mut self, init_state: Array1<f64>, init_cov: f64) {
        let dim = init_state.len();
        self.state = init_state;
        self.cov = Array2::<f64>::eye(dim) * init_cov;
    }

    fn predict(&mut self, _rng: &mut SimRng) -> Result<()> {
        let mut state = self.a.dot(&self.state);
        self.limits.clip(&mut state);
        self.state = state;
        self.cov = self.a.dot(&self.cov).dot(&self.a.t()) + &self.w;
        symmetrize(&mut self.cov);
        Ok(())
    }

    fn update(&mut self, z: [f64; 2], agent: &Pose, map: &dyn OccupancyMap) -> Result<()> {
        // A belief sitting on the sensor has no defined bearing
        let h = match self.jacobian(agent) {
            Some(h) => h,
            None => {
                log::debug!(
                    "belief mean coincides with the agent at ({:.2}, {:.2}); measurement skipped",
                    agent.x,
                    agent.y
                );
                return Ok(());
            }
        };
        let expected = measure(&self.state, agent);
        let innovation = Array1::from_vec(vec![z[0] - expected[0], wrap_around(z[1] - expected[1])]);

        let s = h.dot(&self.cov).dot(&h.t()) + &self.obs_noise;
        let k = self.cov.dot(&h.t()).dot(&inverse(&s)?);

        let mut state = &self.state + &k.dot(&innovation);
        self.limits.clip(&mut state);

        let i_kh = Array2::<f64>::eye(self.state.len()) - k.dot(&h);
        self.cov = i_kh.dot(&self.cov).dot(&i_kh.t()) + k.dot(&self.obs_noise).dot(&k.t());
        symmetrize(&mut self.cov);

        if map.is_collision([state[0], state[1]]) {
            log::warn!(
                "belief update into an obstacle at ({:.2}, {:.2}); keeping the prior mean",
                state[0],
                state[1]
            );
        } else {
            self.state = state;
        }
        Ok(())
    }

    fn state(&self) -> &Array1<f64> {
        &self.state
    }

    fn cov(&self) -> &Array2<f64> {
        &self.cov
    }
}
