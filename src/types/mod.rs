use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geometry::wrap_around;

/// Planar position
pub type Point2 = [f64; 2];

/// The single seeded random source threaded through sampling, motion and sensing
pub type SimRng = rand::rngs::StdRng;

/// SE(2) pose: position and heading (radians, wrapped to [-pi, pi))
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }

    pub fn xy(&self) -> Point2 {
        [self.x, self.y]
    }

    /// Same position, heading wrapped
    pub fn wrapped(self) -> Self {
        Pose { theta: wrap_around(self.theta), ..self }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::new(0.0, 0.0, 0.0)
    }
}

/// Per-target, per-step sensor output
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub detected: bool,
    /// Noisy (range, bearing) when detected
    pub measurement: Option<[f64; 2]>,
}

impl Observation {
    pub fn missed() -> Self {
        Observation { detected: false, measurement: None }
    }
}

/// Auxiliary information returned from `step`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Negated mean log-determinant of the belief covariances (evaluation only)
    pub mean_nlogdetcov: Option<f64>,
}

/// Output of one environment step
#[derive(Clone, Debug)]
pub struct StepResult {
    pub state: Array1<f64>,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Discrete action space: every (linear, angular) velocity pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSpace {
    pairs: Vec<(f64, f64)>,
}

impl ActionSpace {
    /// Index `len(w) * i + j` maps to `(v[i], w[j])`
    pub fn new(linear: &[f64], angular: &[f64]) -> Self {
        let mut pairs = Vec::with_capacity(linear.len() * angular.len());
        for &v in linear {
            for &w in angular {
                pairs.push((v, w));
            }
        }
        ActionSpace { pairs }
    }

    pub fn n(&self) -> usize {
        self.pairs.len()
    }

    pub fn decode(&self, action: usize) -> Result<(f64, f64)> {
        self.pairs.get(action).copied().ok_or(TrackError::InvalidAction {
            action,
            max_actions: self.pairs.len(),
        })
    }

    pub fn pairs(&self) -> &[(f64, f64)] {
        &self.pairs
    }
}

/// Bounded box observation space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    pub low: Array1<f64>,
    pub high: Array1<f64>,
}

impl BoxSpace {
    pub fn new(low: Array1<f64>, high: Array1<f64>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(TrackError::dimension_mismatch(
                format!("{} upper bounds", low.len()),
                format!("{}", high.len()),
            ));
        }
        Ok(BoxSpace { low, high })
    }

    pub fn len(&self) -> usize {
        self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }

    pub fn contains(&self, value: &Array1<f64>) -> bool {
        value.len() == self.len()
            && value
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(&v, (&lo, &hi))| v >= lo && v <= hi)
    }
}

/// Element-wise state bounds used to clip kinematic states
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateLimits {
    pub low: Array1<f64>,
    pub high: Array1<f64>,
}

impl StateLimits {
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Self {
        StateLimits {
            low: Array1::from_vec(low),
            high: Array1::from_vec(high),
        }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn clip(&self, state: &mut Array1<f64>) {
        for ((s, &lo), &hi) in state.iter_mut().zip(self.low.iter()).zip(self.high.iter()) {
            *s = s.max(lo).min(hi);
        }
    }
}
