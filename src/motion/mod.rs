//! # Motion Models
//!
//! Kinematics of the tracking agent and of the hidden targets.
//!
//! - [`Agent`]: SE(2) unicycle driven by the discrete (v, w) actions
//! - [`DoubleIntegrator`]: linear Gaussian targets, 2-D random walk or 4-D constant velocity
//! - [`Se2Target`]: unicycle targets driven by a [`Se2Policy`]
//! - [`FixedPath`]: replay of a precomputed trajectory

use ndarray::{s, Array1, Array2};

use crate::geometry::wrap_around;
use crate::map::OccupancyMap;
use crate::types::{Point2, SimRng};

pub mod agent;
pub mod target;

pub use agent::Agent;
pub use target::{DoubleIntegrator, FixedPath, Se2Policy, Se2Target};

/// World access handed to a target for one motion update
pub struct MotionContext<'a> {
    pub map: &'a dyn OccupancyMap,
    /// Point the target keeps `margin` away from (the agent)
    pub reference: Option<Point2>,
    pub margin: f64,
}

impl MotionContext<'_> {
    /// `true` when `p` collides with the map or intrudes on the reference margin
    pub fn is_invalid(&self, p: Point2) -> bool {
        self.map.is_collision(p) || self.intrudes(p)
    }

    pub fn intrudes(&self, p: Point2) -> bool {
        self.reference
            .map_or(false, |r| (p[0] - r[0]).hypot(p[1] - r[1]) < self.margin)
    }
}

/// Strategy for the true motion of one target
pub trait TargetDynamics: Send {
    fn reset(&mut self, init_state: Array1<f64>);

    /// Advance one sampling period; returns `true` when the move was rejected
    fn update(&mut self, ctx: &MotionContext<'_>, rng: &mut SimRng) -> bool;

    fn state(&self) -> &Array1<f64>;

    fn position(&self) -> Point2 {
        let s = self.state();
        [s[0], s[1]]
    }
}

/// SE(2) unicycle integrated exactly over `dt` for a constant `(v, w)`
pub fn se2_dynamics(pose: [f64; 3], dt: f64, u: (f64, f64)) -> [f64; 3] {
    let (v, w) = u;
    let tw = dt * w;
    let (dx, dy) = if tw.abs() < 1e-3 {
        let mid = pose[2] + tw / 2.0;
        (dt * v * mid.cos(), dt * v * mid.sin())
    } else {
        (
            v / w * ((pose[2] + tw).sin() - pose[2].sin()),
            v / w * (pose[2].cos() - (pose[2] + tw).cos()),
        )
    };
    [pose[0] + dx, pose[1] + dy, wrap_around(pose[2] + tw)]
}

/// SE(2) state carrying its own velocity: `[x, y, theta, v, w]`
pub fn se2_velocity_dynamics(state: &Array1<f64>, dt: f64) -> Array1<f64> {
    let pose = se2_dynamics([state[0], state[1], state[2]], dt, (state[3], state[4]));
    Array1::from_vec(vec![pose[0], pose[1], pose[2], state[3], state[4]])
}

/// Transition matrix of a planar double integrator (`dim` 4) or random walk (`dim` 2)
pub fn double_integrator_transition(dim: usize, dt: f64) -> Array2<f64> {
    let mut a = Array2::<f64>::eye(dim);
    if dim == 4 {
        a[[0, 2]] = dt;
        a[[1, 3]] = dt;
    }
    a
}

/// Process noise of the double integrator for noise constant `q`
pub fn double_integrator_noise(dim: usize, dt: f64, q: f64) -> Array2<f64> {
    let mut w = Array2::<f64>::zeros((dim, dim));
    if dim == 4 {
        let p = dt.powi(3) / 3.0;
        let c = dt.powi(2) / 2.0;
        for i in 0..2 {
            w[[i, i]] = q * p;
            w[[i, i + 2]] = q * c;
            w[[i + 2, i]] = q * c;
            w[[i + 2, i + 2]] = q * dt;
        }
    } else {
        w.diag_mut().fill(q * dt.powi(3) / 3.0);
    }
    w
}

/// True-target noise when the beliefs do not know it
pub fn double_integrator_noise_unknown(dim: usize, dt: f64, q_true: f64) -> Array2<f64> {
    if dim != 4 {
        return Array2::<f64>::eye(dim) * q_true;
    }
    let mut w = Array2::<f64>::zeros((4, 4));
    for i in 0..2 {
        w[[i, i]] = q_true * dt.powi(2) / 2.0;
        w[[i, i + 2]] = q_true * dt / 2.0;
        w[[i + 2, i]] = q_true * dt / 2.0;
        w[[i + 2, i + 2]] = q_true * dt;
    }
    w
}

/// Process noise of the SE(2) models: `dim` 3 (pose) or 5 (pose and velocity)
pub fn se2_noise(dim: usize, dt: f64, q: f64) -> Array2<f64> {
    if dim == 5 {
        let mut w = Array2::<f64>::zeros((5, 5));
        for i in 0..3 {
            w[[i, i]] = q * dt.powi(3) / 3.0;
        }
        w.slice_mut(s![3.., 3..]).assign(&velocity_noise(dt, q));
        w
    } else {
        Array2::<f64>::eye(dim) * (q * dt)
    }
}

/// 2x2 noise on (v, w) of the constant-velocity SE(2) model
pub fn velocity_noise(dt: f64, q: f64) -> Array2<f64> {
    let c = dt.powi(2) / 2.0;
    ndarray::array![[q * dt, q * c], [q * c, q * dt]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::cholesky;
    use std::f64::consts::PI;

    #[test]
    fn test_se2_straight_and_arc() {
        let p = se2_dynamics([0.0, 0.0, 0.0], 0.5, (2.0, 0.0));
        assert!((p[0] - 1.0).abs() < 1e-12);
        assert!(p[1].abs() < 1e-12);

        // Quarter circle of radius 1
        let p = se2_dynamics([0.0, 0.0, 0.0], 1.0, (PI / 2.0, PI / 2.0));
        assert!((p[0] - 1.0).abs() < 1e-9);
        assert!((p[1] - 1.0).abs() < 1e-9);
        assert!((p[2] - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_matrices_are_positive_definite() {
        assert!(cholesky(&double_integrator_noise(4, 0.5, 0.01)).is_some());
        assert!(cholesky(&double_integrator_noise(2, 0.5, 0.01)).is_some());
        assert!(cholesky(&se2_noise(3, 0.5, 0.01)).is_some());
        assert!(cholesky(&se2_noise(5, 0.5, 0.01)).is_some());
    }

    #[test]
    fn test_double_integrator_transition() {
        let a = double_integrator_transition(4, 0.5);
        let x = ndarray::array![1.0, 2.0, 1.0, -2.0];
        let next = a.dot(&x);
        assert_eq!(next, ndarray::array![1.5, 1.0, 1.0, -2.0]);
        assert_eq!(double_integrator_transition(2, 0.5), Array2::<f64>::eye(2));
    }
}
