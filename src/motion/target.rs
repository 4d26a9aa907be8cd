use ndarray::{s, Array1, Array2};
use rand::Rng;
use std::f64::consts::PI;

use super::{se2_dynamics, MotionContext, TargetDynamics};
use crate::geometry::wrap_around;
use crate::linalg::sample_gaussian;
use crate::types::{Pose, SimRng, StateLimits};

/// Speed of the random velocity drawn after a rejected double-integrator move
const BOUNCE_SPEED: f64 = 0.2;

/// Linear Gaussian target: `x' = A x + w`, `w ~ N(0, W)`
pub struct DoubleIntegrator {
    a: Array2<f64>,
    w: Array2<f64>,
    limits: StateLimits,
    state: Array1<f64>,
    /// Obstacles closer than this deflect the velocity (4-D only)
    avoid_radius: Option<f64>,
}

impl DoubleIntegrator {
    pub fn new(a: Array2<f64>, w: Array2<f64>, limits: StateLimits) -> Self {
        let dim = limits.dim();
        DoubleIntegrator {
            a,
            w,
            limits,
            state: Array1::zeros(dim),
            avoid_radius: None,
        }
    }

    pub fn with_obstacle_avoidance(mut self, radius: f64) -> Self {
        self.avoid_radius = Some(radius);
        self
    }

    fn dim(&self) -> usize {
        self.state.len()
    }

    /// Reflect the velocity component heading into the nearest obstacle
    fn deflect(&self, ctx: &MotionContext<'_>, state: &mut Array1<f64>) {
        let radius = match self.avoid_radius {
            Some(r) if self.dim() == 4 => r,
            _ => return,
        };
        let probe = Pose::new(state[0], state[1], 0.0);
        if let Some((_, bearing)) = ctx.map.closest_obstacle(&probe, 2.0 * PI, radius) {
            let (uy, ux) = bearing.sin_cos();
            let toward = state[2] * ux + state[3] * uy;
            if toward > 0.0 {
                state[2] -= 2.0 * toward * ux;
                state[3] -= 2.0 * toward * uy;
            }
        }
    }
}

impl TargetDynamics for DoubleIntegrator {
    fn reset(&mut self, init_state: Array1<f64>) {
        self.state = init_state;
    }

    fn update(&mut self, ctx: &MotionContext<'_>, rng: &mut SimRng) -> bool {
        let mut current = self.state.clone();
        self.deflect(ctx, &mut current);
        let mut next = self.a.dot(&current) + sample_gaussian(&self.w, rng);

        let rejected = ctx.is_invalid([next[0], next[1]]);
        if rejected {
            next[0] = self.state[0];
            next[1] = self.state[1];
            if self.dim() > 2 {
                next[2] = rng.gen_range(-BOUNCE_SPEED..BOUNCE_SPEED);
                next[3] = rng.gen_range(-BOUNCE_SPEED..BOUNCE_SPEED);
            }
        }
        self.limits.clip(&mut next);
        self.state = next;
        rejected
    }

    fn state(&self) -> &Array1<f64> {
        &self.state
    }
}

/// Control law of an SE(2) target
#[derive(Clone, Debug)]
pub enum Se2Policy {
    /// Constant forward speed with a sinusoidal turn rate
    Sine {
        amplitude: f64,
        period: f64,
        speed: f64,
        dt: f64,
        t: f64,
    },
    /// Random walk on the target's own (v, w)
    Constant {
        noise: Array2<f64>,
        speed_limit: f64,
    },
}

impl Se2Policy {
    pub fn sine(amplitude: f64, period: f64, speed: f64, dt: f64) -> Self {
        Se2Policy::Sine { amplitude, period, speed, dt, t: 0.0 }
    }

    pub fn constant(noise: Array2<f64>, speed_limit: f64) -> Self {
        Se2Policy::Constant { noise, speed_limit }
    }

    pub fn reset(&mut self) {
        if let Se2Policy::Sine { t, .. } = self {
            *t = 0.0;
        }
    }

    fn control(&mut self, state: &Array1<f64>, rng: &mut SimRng) -> (f64, f64) {
        match self {
            Se2Policy::Sine { amplitude, period, speed, dt, t } => {
                let w = *amplitude * (2.0 * PI * *t / *period).sin();
                *t += *dt;
                (*speed, w)
            }
            Se2Policy::Constant { noise, speed_limit } => {
                let (v, w) = if state.len() >= 5 { (state[3], state[4]) } else { (0.0, 0.0) };
                let dv = sample_gaussian(noise, rng);
                (
                    (v + dv[0]).clamp(-*speed_limit, *speed_limit),
                    (w + dv[1]).clamp(-PI, PI),
                )
            }
        }
    }
}

/// Unicycle target with state `[x, y, theta]` or `[x, y, theta, v, w]`
pub struct Se2Target {
    policy: Se2Policy,
    dt: f64,
    limits: StateLimits,
    state: Array1<f64>,
}

impl Se2Target {
    pub fn new(policy: Se2Policy, dt: f64, limits: StateLimits) -> Self {
        let dim = limits.dim();
        Se2Target {
            policy,
            dt,
            limits,
            state: Array1::zeros(dim),
        }
    }
}

impl TargetDynamics for Se2Target {
    fn reset(&mut self, init_state: Array1<f64>) {
        self.state = init_state;
        self.policy.reset();
    }

    fn update(&mut self, ctx: &MotionContext<'_>, rng: &mut SimRng) -> bool {
        let u = self.policy.control(&self.state, rng);
        let pose = se2_dynamics([self.state[0], self.state[1], self.state[2]], self.dt, u);
        let mut next = self.state.clone();
        next[0] = pose[0];
        next[1] = pose[1];
        next[2] = pose[2];
        if next.len() >= 5 {
            next[3] = u.0;
            next[4] = u.1;
        }
        let rejected = ctx.is_invalid([next[0], next[1]]);
        if rejected {
            next[0] = self.state[0];
            next[1] = self.state[1];
            next[2] = wrap_around(self.state[2] + PI);
        }
        self.limits.clip(&mut next);
        self.state = next;
        rejected
    }

    fn state(&self) -> &Array1<f64> {
        &self.state
    }
}

/// Replays a precomputed `(x, y, vx, vy)` trajectory, holding its last row
pub struct FixedPath {
    path: Array2<f64>,
    t: usize,
    state: Array1<f64>,
}

impl FixedPath {
    /// `path` is `T x 4`
    pub fn new(path: Array2<f64>) -> Self {
        let mut fixed = FixedPath {
            state: Array1::zeros(path.ncols()),
            path,
            t: 0,
        };
        fixed.state = fixed.start();
        fixed
    }

    /// First row, or zeros for an empty path
    pub fn start(&self) -> Array1<f64> {
        self.path
            .outer_iter()
            .next()
            .map(|row| row.to_owned())
            .unwrap_or_else(|| Array1::zeros(self.path.ncols()))
    }

    pub fn len(&self) -> usize {
        self.path.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.path.nrows() == 0
    }
}

impl TargetDynamics for FixedPath {
    fn reset(&mut self, init_state: Array1<f64>) {
        self.t = 0;
        self.state = init_state;
    }

    fn update(&mut self, _ctx: &MotionContext<'_>, _rng: &mut SimRng) -> bool {
        if self.is_empty() {
            return false;
        }
        self.t = (self.t + 1).min(self.path.nrows() - 1);
        self.state = self.path.slice(s![self.t, ..]).to_owned();
        false
    }

    fn state(&self) -> &Array1<f64> {
        &self.state
    }
}
