use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::belief::{BeliefFilter, KalmanBelief, Se2Model, UnscentedBelief};
use crate::compose::{MapAugmentation, VelocityFeatures};
use crate::error::{Result, TrackError};
use crate::motion::{
    double_integrator_noise, double_integrator_noise_unknown, double_integrator_transition, se2_noise,
    velocity_noise, DoubleIntegrator, Se2Policy, Se2Target, TargetDynamics,
};
use crate::types::{Point2, Pose, StateLimits};

/// Obstacles closer than this deflect an obstacle-avoiding target
const OBSTACLE_AVOID_RADIUS: f64 = 2.0;

/// Sinusoidal policy of the SE(2) targets
const SINE_AMPLITUDE: f64 = 0.1;
const SINE_PERIOD: f64 = 5.0;
const SINE_SPEED: f64 = 0.5;

/// The ten tracking environments
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
}

/// True motion of the targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicsKind {
    /// 2-D random walk
    RandomWalk,
    /// 4-D constant velocity
    DoubleIntegrator { avoid_obstacles: bool },
    /// Precomputed trajectories
    FixedPath,
    /// SE(2) pose driven by a sinusoidal turn rate
    Se2Sine,
    /// SE(2) pose and velocity with a velocity random walk
    Se2Constant,
}

/// Belief filter paired with the dynamics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Kalman { dim: usize },
    Unscented(Se2Model),
}

/// Ordering of prediction and measurement update within a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeliefTiming {
    /// Reset composes without sensing; a step moves, observes, predicts, then updates
    PredictThenUpdate,
    /// Reset observes, updates and predicts; a step observes, updates, rewards, then predicts
    UpdateThenPredict,
}

/// How the visit-frequency grid is stamped after each observation cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitUpdate {
    None,
    /// Plain footprint stamp
    Unobserved,
    /// Saturating stamp when any target was observed
    Observed,
}

/// Strategies assembled into one variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantProfile {
    pub dynamics: DynamicsKind,
    pub filter: FilterKind,
    pub timing: BeliefTiming,
    pub velocity: VelocityFeatures,
    pub belief_blocked: bool,
    pub front_range: bool,
    pub map: MapAugmentation,
    pub default_im_size: usize,
    /// Targets stay still until first observed
    pub discovery_gated: bool,
    pub visit: VisitUpdate,
}

impl Variant {
    pub const ALL: [Variant; 10] = [
        Variant::V0,
        Variant::V1,
        Variant::V2,
        Variant::V3,
        Variant::V4,
        Variant::V5,
        Variant::V6,
        Variant::V7,
        Variant::V8,
        Variant::V9,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Variant::V0 => "TargetTracking-v0",
            Variant::V1 => "TargetTracking-v1",
            Variant::V2 => "TargetTracking-v2",
            Variant::V3 => "TargetTracking-v3",
            Variant::V4 => "TargetTracking-v4",
            Variant::V5 => "TargetTracking-v5",
            Variant::V6 => "TargetTracking-v6",
            Variant::V7 => "TargetTracking-v7",
            Variant::V8 => "TargetTracking-v8",
            Variant::V9 => "TargetTracking-v9",
        }
    }

    pub fn profile(&self) -> VariantProfile {
        // Double-integrator, feature-only, update-then-predict
        let base = VariantProfile {
            dynamics: DynamicsKind::DoubleIntegrator { avoid_obstacles: true },
            filter: FilterKind::Kalman { dim: 4 },
            timing: BeliefTiming::UpdateThenPredict,
            velocity: VelocityFeatures::Cartesian,
            belief_blocked: false,
            front_range: false,
            map: MapAugmentation::None,
            default_im_size: 28,
            discovery_gated: true,
            visit: VisitUpdate::None,
        };
        match self {
            Variant::V0 => VariantProfile {
                dynamics: DynamicsKind::RandomWalk,
                filter: FilterKind::Kalman { dim: 2 },
                timing: BeliefTiming::PredictThenUpdate,
                velocity: VelocityFeatures::None,
                discovery_gated: false,
                ..base
            },
            Variant::V1 => base,
            Variant::V2 => VariantProfile {
                dynamics: DynamicsKind::FixedPath,
                ..base
            },
            Variant::V3 => VariantProfile {
                dynamics: DynamicsKind::Se2Sine,
                filter: FilterKind::Unscented(Se2Model::Pose),
                timing: BeliefTiming::PredictThenUpdate,
                velocity: VelocityFeatures::None,
                discovery_gated: false,
                ..base
            },
            Variant::V4 => VariantProfile {
                dynamics: DynamicsKind::Se2Constant,
                filter: FilterKind::Unscented(Se2Model::PoseVelocity),
                timing: BeliefTiming::PredictThenUpdate,
                velocity: VelocityFeatures::Se2,
                discovery_gated: false,
                ..base
            },
            Variant::V5 => VariantProfile {
                map: MapAugmentation::Occupancy,
                ..base
            },
            Variant::V6 => VariantProfile {
                timing: BeliefTiming::PredictThenUpdate,
                map: MapAugmentation::OccupancyAndVisit,
                default_im_size: 50,
                discovery_gated: false,
                visit: VisitUpdate::Unobserved,
                ..base
            },
            Variant::V7 => VariantProfile {
                belief_blocked: true,
                map: MapAugmentation::OccupancyAndSurroundings,
                visit: VisitUpdate::Observed,
                ..base
            },
            Variant::V8 => VariantProfile {
                map: MapAugmentation::OccupancyAndSurroundings,
                visit: VisitUpdate::Unobserved,
                ..base
            },
            Variant::V9 => VariantProfile {
                belief_blocked: true,
                front_range: true,
                map: MapAugmentation::OccupancyAndSurroundings,
                visit: VisitUpdate::Observed,
                ..base
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Variant {
    type Err = TrackError;

    /// Accepts `TargetTracking-v3` as well as the short `v3`
    fn from_str(s: &str) -> Result<Self> {
        let short = s.strip_prefix("TargetTracking-").unwrap_or(s);
        Variant::ALL
            .iter()
            .copied()
            .find(|v| v.id().ends_with(short) && short.starts_with('v') && short.len() == 2)
            .ok_or_else(|| TrackError::UnknownEnvironment(s.to_string()))
    }
}

/// Constants the target and belief models are built from
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelSetup {
    pub sampling_period: f64,
    pub bounds: (Point2, Point2),
    pub speed_limit: f64,
    pub const_q: f64,
    pub const_q_true: f64,
    pub known_noise: bool,
}

impl ModelSetup {
    fn limits(&self, dim: usize) -> StateLimits {
        let (lo, hi) = self.bounds;
        let s = self.speed_limit;
        match dim {
            2 => StateLimits::new(lo.to_vec(), hi.to_vec()),
            3 => StateLimits::new(vec![lo[0], lo[1], -PI], vec![hi[0], hi[1], PI]),
            4 => StateLimits::new(vec![lo[0], lo[1], -s, -s], vec![hi[0], hi[1], s, s]),
            _ => StateLimits::new(vec![lo[0], lo[1], -PI, -s, -PI], vec![hi[0], hi[1], PI, s, PI]),
        }
    }
}

impl DynamicsKind {
    /// Simulated target model; fixed paths are built from their trajectories instead
    pub fn build(&self, setup: &ModelSetup) -> Option<Box<dyn TargetDynamics>> {
        let dt = setup.sampling_period;
        let double_integrator = |dim: usize| {
            let w = if setup.known_noise {
                double_integrator_noise(dim, dt, setup.const_q)
            } else {
                double_integrator_noise_unknown(dim, dt, setup.const_q_true)
            };
            DoubleIntegrator::new(double_integrator_transition(dim, dt), w, setup.limits(dim))
        };
        let target: Box<dyn TargetDynamics> = match self {
            DynamicsKind::RandomWalk => Box::new(double_integrator(2)),
            DynamicsKind::DoubleIntegrator { avoid_obstacles: false } => Box::new(double_integrator(4)),
            DynamicsKind::DoubleIntegrator { avoid_obstacles: true } => {
                Box::new(double_integrator(4).with_obstacle_avoidance(OBSTACLE_AVOID_RADIUS))
            }
            DynamicsKind::FixedPath => return None,
            DynamicsKind::Se2Sine => Box::new(Se2Target::new(
                Se2Policy::sine(SINE_AMPLITUDE, SINE_PERIOD, SINE_SPEED, dt),
                dt,
                setup.limits(3),
            )),
            DynamicsKind::Se2Constant => Box::new(Se2Target::new(
                Se2Policy::constant(velocity_noise(dt, setup.const_q), setup.speed_limit),
                dt,
                setup.limits(5),
            )),
        };
        Some(target)
    }

    /// Initial true state from a sampled pose
    pub fn init_state(&self, pose: &Pose, init_vel: [f64; 2]) -> Array1<f64> {
        match self {
            DynamicsKind::RandomWalk => Array1::from_vec(vec![pose.x, pose.y]),
            DynamicsKind::DoubleIntegrator { .. } | DynamicsKind::FixedPath => {
                Array1::from_vec(vec![pose.x, pose.y, init_vel[0], init_vel[1]])
            }
            DynamicsKind::Se2Sine => Array1::from_vec(vec![pose.x, pose.y, pose.theta]),
            DynamicsKind::Se2Constant => Array1::from_vec(vec![pose.x, pose.y, pose.theta, init_vel[0], 0.0]),
        }
    }

    /// Whether the target keeps the agent margin when it moves
    pub fn keeps_agent_margin(&self) -> bool {
        matches!(self, DynamicsKind::RandomWalk | DynamicsKind::DoubleIntegrator { .. })
    }
}

impl FilterKind {
    pub fn dim(&self) -> usize {
        match self {
            FilterKind::Kalman { dim } => *dim,
            FilterKind::Unscented(model) => model.dim(),
        }
    }

    pub fn build(&self, setup: &ModelSetup, obs_noise: Array2<f64>) -> Result<Box<dyn BeliefFilter>> {
        let dt = setup.sampling_period;
        let dim = self.dim();
        Ok(match self {
            FilterKind::Kalman { .. } => Box::new(KalmanBelief::new(
                double_integrator_transition(dim, dt),
                double_integrator_noise(dim, dt, setup.const_q),
                obs_noise,
                setup.limits(dim),
            )?),
            FilterKind::Unscented(model) => Box::new(UnscentedBelief::new(
                *model,
                dt,
                se2_noise(dim, dt, setup.const_q),
                obs_noise,
                setup.limits(dim),
            )?),
        })
    }

    /// Initial belief mean from a sampled pose; velocities start at zero
    pub fn init_state(&self, pose: &Pose) -> Array1<f64> {
        let mut state = Array1::<f64>::zeros(self.dim());
        state[0] = pose.x;
        state[1] = pose.y;
        if matches!(self, FilterKind::Unscented(_)) {
            state[2] = pose.theta;
        }
        state
    }
}
