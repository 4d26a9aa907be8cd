//! Reward shapes over the belief uncertainty.
//!
//! Every shape consumes the log-determinants of the current belief covariances and
//! never ends the episode; termination belongs to whatever wraps the environment.

use serde::{Deserialize, Serialize};

use crate::config::RewardWeights;

/// Per-step quantities a reward shape may use
#[derive(Clone, Copy, Debug)]
pub struct RewardInput<'a> {
    /// `ln det(cov)` of every belief
    pub log_dets: &'a [f64],
    pub collided: bool,
    /// Nearest obstacle `(range, bearing)`, if any
    pub obstacle: Option<(f64, f64)>,
    pub observed: &'a [bool],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardOutput {
    pub reward: f64,
    pub done: bool,
    /// Negated mean log-determinant, computed outside training only
    pub mean_nlogdetcov: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardKind {
    /// `c_mean * -mean(logdet)`
    Uncertainty,
    /// Uncertainty term, capped at zero and penalized on collision
    #[default]
    UncertaintyWithCollision,
    /// Wall proximity penalty, spread and observation bonus
    Shaped,
}

impl RewardKind {
    pub fn evaluate(
        &self,
        input: &RewardInput<'_>,
        weights: &RewardWeights,
        margin2wall: f64,
        is_training: bool,
    ) -> RewardOutput {
        let reward = match self {
            RewardKind::Uncertainty => uncertainty_reward(input.log_dets, weights.c_mean),
            RewardKind::UncertaintyWithCollision => {
                collision_reward(input.log_dets, input.collided, weights.c_mean, weights.c_penalty)
            }
            RewardKind::Shaped => shaped_reward(input, weights, margin2wall),
        };
        RewardOutput {
            reward,
            done: false,
            mean_nlogdetcov: (!is_training).then(|| -mean(input.log_dets)),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn uncertainty_reward(log_dets: &[f64], c_mean: f64) -> f64 {
    c_mean * -mean(log_dets)
}

pub fn collision_reward(log_dets: &[f64], collided: bool, c_mean: f64, c_penalty: f64) -> f64 {
    let reward = uncertainty_reward(log_dets, c_mean);
    if collided {
        reward.min(0.0) - c_penalty
    } else {
        reward
    }
}

pub fn shaped_reward(input: &RewardInput<'_>, weights: &RewardWeights, margin2wall: f64) -> f64 {
    let m2 = margin2wall * margin2wall;
    let penalty = match input.obstacle {
        None => 0.0,
        Some((r, _)) => m2 / m2.max(r * r),
    };
    let reward = -weights.c_penalty * penalty
        + weights.c_mean * -mean(input.log_dets)
        + weights.c_std * -std_dev(input.log_dets);
    if input.observed.iter().any(|&o| o) {
        let observed_ratio = input.observed.iter().filter(|&&o| o).count() as f64 / input.observed.len() as f64;
        reward.max(0.0) + weights.c_observed * observed_ratio
    } else {
        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(log_dets: &'a [f64], collided: bool, observed: &'a [bool]) -> RewardInput<'a> {
        RewardInput { log_dets, collided, obstacle: None, observed }
    }

    #[test]
    fn test_unit_determinant_gives_zero() {
        let weights = RewardWeights::default();
        let out = RewardKind::default().evaluate(&input(&[0.0, 0.0], false, &[false, false]), &weights, 0.5, false);
        assert_eq!(out.reward, 0.0);
        assert!(!out.done);
        assert_eq!(out.mean_nlogdetcov, Some(0.0));

        let out = RewardKind::default().evaluate(&input(&[0.0, 0.0], true, &[false, false]), &weights, 0.5, false);
        assert_eq!(out.reward, -weights.c_penalty);
    }

    #[test]
    fn test_collision_caps_positive_reward() {
        // Small covariances give a positive uncertainty term
        let r = collision_reward(&[-10.0], false, 0.1, 1.0);
        assert!((r - 1.0).abs() < 1e-12);
        let r = collision_reward(&[-10.0], true, 0.1, 1.0);
        assert!((r + 1.0).abs() < 1e-12);
        let r = collision_reward(&[10.0], true, 0.1, 1.0);
        assert!((r + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_training_skips_metric() {
        let weights = RewardWeights::default();
        let out = RewardKind::Uncertainty.evaluate(&input(&[2.0, 4.0], false, &[true, false]), &weights, 0.5, true);
        assert_eq!(out.mean_nlogdetcov, None);
        assert!((out.reward + 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_shaped_reward_terms() {
        let weights = RewardWeights::default();
        let log_dets = [2.0, 4.0];
        let mut inp = input(&log_dets, false, &[false, false]);
        inp.obstacle = Some((0.25, 0.0));
        // Full wall penalty, mean 3, std 1
        let r = RewardKind::Shaped.evaluate(&inp, &weights, 0.5, true).reward;
        assert!((r - (-1.0 - 0.3 - 0.1)).abs() < 1e-12);

        let observed = [true, false];
        inp.observed = &observed;
        let r = RewardKind::Shaped.evaluate(&inp, &weights, 0.5, true).reward;
        assert!((r - 0.05).abs() < 1e-12);
    }
}
