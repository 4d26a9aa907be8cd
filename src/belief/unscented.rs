use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{measure, BeliefFilter};
use crate::error::{Result, TrackError};
use crate::geometry::wrap_around;
use crate::linalg::{cholesky, inverse, symmetrize};
use crate::map::OccupancyMap;
use crate::motion::{se2_dynamics, se2_velocity_dynamics};
use crate::types::{Pose, SimRng, StateLimits};

const ALPHA: f64 = 1.0;
const BETA: f64 = 2.0;
const KAPPA: f64 = 0.0;

/// Index of the heading in every SE(2) state
const HEADING: usize = 2;

/// Process model propagated through the sigma points
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Se2Model {
    /// `[x, y, theta]`, driven by an unknown control drawn at random each prediction
    Pose,
    /// `[x, y, theta, v, w]`, carrying its own velocity
    PoseVelocity,
}

impl Se2Model {
    pub fn dim(&self) -> usize {
        match self {
            Se2Model::Pose => 3,
            Se2Model::PoseVelocity => 5,
        }
    }
}

/// Unscented Kalman belief over SE(2) target states
pub struct UnscentedBelief {
    model: Se2Model,
    dt: f64,
    w: Array2<f64>,
    obs_noise: Array2<f64>,
    limits: StateLimits,
    state: Array1<f64>,
    cov: Array2<f64>,
    lambda: f64,
    wm: Vec<f64>,
    wc: Vec<f64>,
}

impl UnscentedBelief {
    pub fn new(
        model: Se2Model,
        dt: f64,
        w: Array2<f64>,
        obs_noise: Array2<f64>,
        limits: StateLimits,
    ) -> Result<Self> {
        let n = model.dim();
        if w.dim() != (n, n) || limits.dim() != n {
            return Err(TrackError::dimension_mismatch(
                format!("{n}-dimensional noise and limits"),
                format!("{:?} noise, {} limits", w.dim(), limits.dim()),
            ));
        }
        let lambda = ALPHA * ALPHA * (n as f64 + KAPPA) - n as f64;
        let spread = n as f64 + lambda;
        let mut wm = vec![1.0 / (2.0 * spread); 2 * n + 1];
        let mut wc = wm.clone();
        wm[0] = lambda / spread;
        wc[0] = lambda / spread + (1.0 - ALPHA * ALPHA + BETA);
        Ok(UnscentedBelief {
            model,
            dt,
            w,
            obs_noise,
            limits,
            state: Array1::zeros(n),
            cov: Array2::eye(n),
            lambda,
            wm,
            wc,
        })
    }

    fn sigma_points(&self) -> Result<Vec<Array1<f64>>> {
        let n = self.state.len();
        let scaled = &self.cov * (n as f64 + self.lambda);
        let l = cholesky(&scaled).ok_or_else(|| {
            TrackError::NumericalError("belief covariance is not positive definite".to_string())
        })?;
        let mut points = Vec::with_capacity(2 * n + 1);
        points.push(self.state.clone());
        for sign in [1.0, -1.0] {
            for i in 0..n {
                let mut p = &self.state + &(&l.column(i) * sign);
                p[HEADING] = wrap_around(p[HEADING]);
                points.push(p);
            }
        }
        Ok(points)
    }

    /// Weighted mean of states with a circular mean on the heading
    fn state_mean(&self, points: &[Array1<f64>]) -> Array1<f64> {
        let mut mean = Array1::<f64>::zeros(self.state.len());
        let (mut s, mut c) = (0.0, 0.0);
        for (p, &w) in points.iter().zip(&self.wm) {
            mean.scaled_add(w, p);
            s += w * p[HEADING].sin();
            c += w * p[HEADING].cos();
        }
        mean[HEADING] = s.atan2(c);
        mean
    }

    fn state_residual(&self, a: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
        let mut d = a - b;
        d[HEADING] = wrap_around(d[HEADING]);
        d
    }

    fn propagate(&self, p: &Array1<f64>, u: (f64, f64)) -> Array1<f64> {
        match self.model {
            Se2Model::Pose => {
                let next = se2_dynamics([p[0], p[1], p[2]], self.dt, u);
                Array1::from_vec(next.to_vec())
            }
            Se2Model::PoseVelocity => se2_velocity_dynamics(p, self.dt),
        }
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

impl BeliefFilter for UnscentedBelief {
    fn reset(&mut self, init_state: Array1<f64>, init_cov: f64) {
        let dim = init_state.len();
        self.state = init_state;
        self.state[HEADING] = wrap_around(self.state[HEADING]);
        self.cov = Array2::<f64>::eye(dim) * init_cov;
    }

    fn predict(&mut self, rng: &mut SimRng) -> Result<()> {
        // The target's control is unknown to the belief
        let u = (rng.gen::<f64>(), PI * rng.gen::<f64>() - 0.5 * PI);
        let points: Vec<Array1<f64>> = self
            .sigma_points()?
            .iter()
            .map(|p| self.propagate(p, u))
            .collect();
        let mut mean = self.state_mean(&points);

        let mut cov = self.w.clone();
        for (p, &w) in points.iter().zip(&self.wc) {
            let d = self.state_residual(p, &mean);
            cov.scaled_add(w, &outer(&d, &d));
        }
        symmetrize(&mut cov);

        self.limits.clip(&mut mean);
        self.state = mean;
        self.cov = cov;
        Ok(())
    }

    fn update(&mut self, z: [f64; 2], agent: &Pose, map: &dyn OccupancyMap) -> Result<()> {
        let points = self.sigma_points()?;
        let zs: Vec<[f64; 2]> = points.iter().map(|p| measure(p, agent)).collect();

        let (mut r_mean, mut s, mut c) = (0.0, 0.0, 0.0);
        for (zi, &w) in zs.iter().zip(&self.wm) {
            r_mean += w * zi[0];
            s += w * zi[1].sin();
            c += w * zi[1].cos();
        }
        let z_mean = [r_mean, s.atan2(c)];

        let mut pzz = self.obs_noise.clone();
        let mut pxz = Array2::<f64>::zeros((self.state.len(), 2));
        for ((p, zi), &w) in points.iter().zip(&zs).zip(&self.wc) {
            let dz = Array1::from_vec(vec![zi[0] - z_mean[0], wrap_around(zi[1] - z_mean[1])]);
            let dx = self.state_residual(p, &self.state);
            pzz.scaled_add(w, &outer(&dz, &dz));
            pxz.scaled_add(w, &outer(&dx, &dz));
        }

        let k = pxz.dot(&inverse(&pzz)?);
        let innovation = Array1::from_vec(vec![z[0] - z_mean[0], wrap_around(z[1] - z_mean[1])]);
        let mut state = &self.state + &k.dot(&innovation);
        state[HEADING] = wrap_around(state[HEADING]);
        self.limits.clip(&mut state);

        self.cov = &self.cov - &k.dot(&pzz).dot(&k.t());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::range_bearing_noise;
    use crate::map::GridMap;
    use crate::motion::se2_noise;
    use ndarray::array;
    use rand::SeedableRng;

    fn limits(model: Se2Model) -> StateLimits {
        match model {
            Se2Model::Pose => StateLimits::new(vec![-50.0, -50.0, -PI], vec![50.0, 50.0, PI]),
            Se2Model::PoseVelocity => StateLimits::new(
                vec![-50.0, -50.0, -PI, -1.0, -PI],
                vec![50.0, 50.0, PI, 1.0, PI],
            ),
        }
    }

    fn belief(model: Se2Model) -> UnscentedBelief {
        UnscentedBelief::new(
            model,
            0.5,
            se2_noise(model.dim(), 0.5, 0.01),
            range_bearing_noise(0.2, 0.01),
            limits(model),
        )
        .unwrap()
    }

    #[test]
    fn test_weights_are_non_negative_and_normalized() {
        let b = belief(Se2Model::PoseVelocity);
        assert!(b.wm.iter().all(|&w| w >= 0.0));
        assert!(b.wc.iter().all(|&w| w >= 0.0));
        assert!((b.wm.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_predict_keeps_covariance_positive_definite() {
        let mut rng = SimRng::seed_from_u64(7);
        for model in [Se2Model::Pose, Se2Model::PoseVelocity] {
            let mut b = belief(model);
            let mut init = Array1::<f64>::zeros(model.dim());
            init[0] = 3.0;
            b.reset(init, 30.0);
            for _ in 0..20 {
                b.predict(&mut rng).unwrap();
                assert!(b.log_det_cov().is_ok());
                assert!(b.state()[HEADING].abs() <= PI);
            }
        }
    }

    #[test]
    fn test_update_moves_toward_measurement() {
        let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
        let mut b = belief(Se2Model::Pose);
        b.reset(array![4.0, 1.0, 0.0], 0.5);
        let agent = Pose::new(0.0, 0.0, 0.0);
        let before = b.log_det_cov().unwrap();
        b.update([6.0, 0.0], &agent, &map).unwrap();
        assert!(b.log_det_cov().unwrap() < before);
        assert!((b.state()[0] - 6.0).abs() < 0.5);
        assert!(b.state()[1].abs() < 0.5);
    }

    #[test]
    fn test_velocity_model_integrates_its_speed() {
        let mut rng = SimRng::seed_from_u64(1);
        let mut b = belief(Se2Model::PoseVelocity);
        b.reset(array![0.0, 0.0, 0.0, 1.0, 0.0], 1e-4);
        b.predict(&mut rng).unwrap();
        assert!((b.state()[0] - 0.5).abs() < 1e-3);
    }
}
