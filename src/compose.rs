//! State-vector layouts.
//!
//! A state is `[map prefix] ++ [target block] * num_targets ++ [obstacle block]`.
//! The map prefix holds egocentric image channels shifted into [-1, 1]. A target block
//! is `r, alpha, (r_dot, alpha_dot), logdet, observed, (blocked)` for the belief of
//! that target; the obstacle block is `o_r, o_alpha, (front range)`.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{Result, TrackError};
use crate::geometry::{relative_distance_polar, relative_velocity_polar, relative_velocity_polar_se2};
use crate::map::OccupancyMap;
use crate::types::{BoxSpace, Pose};

const RANGE_HIGH: f64 = 600.0;
const LOGDET_LIMIT: f64 = 50.0;
const BEARING_RATE_LIMIT: f64 = 10.0 * PI;
const FLAG_HIGH: f64 = 2.0;

/// How the relative velocity of a belief is read from its state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityFeatures {
    /// No velocity fields in the target block
    None,
    /// `[x, y, vx, vy]` beliefs
    Cartesian,
    /// `[x, y, theta, v, w]` beliefs
    Se2,
}

/// Image channels prepended to the state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapAugmentation {
    None,
    /// Local occupancy crop
    Occupancy,
    /// Local occupancy crop followed by the visit crop over the same cells
    OccupancyAndVisit,
    /// Local occupancy crop interleaved with the front, back, left and right visit crops
    OccupancyAndSurroundings,
}

impl MapAugmentation {
    pub fn channels(&self) -> usize {
        match self {
            MapAugmentation::None => 0,
            MapAugmentation::Occupancy => 1,
            MapAugmentation::OccupancyAndVisit => 2,
            MapAugmentation::OccupancyAndSurroundings => 5,
        }
    }
}

/// Features of one belief relative to the agent
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TargetFeatures {
    pub r: f64,
    pub alpha: f64,
    pub r_dot: f64,
    pub alpha_dot: f64,
    pub logdet: f64,
    pub observed: bool,
    pub blocked: bool,
}

impl TargetFeatures {
    /// Relative range, bearing and (when requested) their rates; the other fields are left default
    pub fn relative(
        belief_state: &Array1<f64>,
        agent: &Pose,
        action_vw: (f64, f64),
        velocity: VelocityFeatures,
    ) -> Self {
        let xy = [belief_state[0], belief_state[1]];
        let (r, alpha) = relative_distance_polar(xy, agent.xy(), agent.theta);
        let (r_dot, alpha_dot) = match velocity {
            VelocityFeatures::None => (0.0, 0.0),
            VelocityFeatures::Cartesian => relative_velocity_polar(
                xy,
                [belief_state[2], belief_state[3]],
                agent.xy(),
                agent.theta,
                action_vw.0,
                action_vw.1,
            ),
            VelocityFeatures::Se2 => relative_velocity_polar_se2(
                &Pose::new(belief_state[0], belief_state[1], belief_state[2]),
                (belief_state[3], belief_state[4]),
                agent,
                action_vw,
            ),
        };
        TargetFeatures {
            r,
            alpha,
            r_dot,
            alpha_dot,
            ..Default::default()
        }
    }
}

/// Nearest-obstacle readings; `None` means nothing within sensor range
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ObstacleFeatures {
    pub closest: Option<(f64, f64)>,
    pub front_range: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateLayout {
    pub num_targets: usize,
    pub velocity: VelocityFeatures,
    pub belief_blocked: bool,
    pub front_range: bool,
    pub map: MapAugmentation,
    pub im_size: usize,
    pub sensor_r: f64,
    pub rel_speed_limit: f64,
}

impl StateLayout {
    pub fn map_len(&self) -> usize {
        self.map.channels() * self.im_size * self.im_size
    }

    pub fn target_block_len(&self) -> usize {
        let velocity = if self.velocity == VelocityFeatures::None { 0 } else { 2 };
        4 + velocity + usize::from(self.belief_blocked)
    }

    pub fn trailing_len(&self) -> usize {
        2 + usize::from(self.front_range)
    }

    pub fn len(&self) -> usize {
        self.map_len() + self.num_targets * self.target_block_len() + self.trailing_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn target_offset(&self, i: usize) -> usize {
        self.map_len() + i * self.target_block_len()
    }

    pub fn logdet_index(&self, i: usize) -> usize {
        let skip = if self.velocity == VelocityFeatures::None { 2 } else { 4 };
        self.target_offset(i) + skip
    }

    pub fn observed_index(&self, i: usize) -> usize {
        self.logdet_index(i) + 1
    }

    pub fn obstacle_offset(&self) -> usize {
        self.target_offset(self.num_targets)
    }

    /// Declared observation bounds
    pub fn bounds(&self) -> BoxSpace {
        let mut low = vec![-1.0; self.map_len()];
        let mut high = vec![1.0; self.map_len()];
        for _ in 0..self.num_targets {
            low.extend([0.0, -PI]);
            high.extend([RANGE_HIGH, PI]);
            if self.velocity != VelocityFeatures::None {
                low.extend([-self.rel_speed_limit, -BEARING_RATE_LIMIT]);
                high.extend([self.rel_speed_limit, BEARING_RATE_LIMIT]);
            }
            low.extend([-LOGDET_LIMIT, 0.0]);
            high.extend([LOGDET_LIMIT, FLAG_HIGH]);
            if self.belief_blocked {
                low.push(0.0);
                high.push(FLAG_HIGH);
            }
        }
        low.extend([0.0, -PI]);
        high.extend([self.sensor_r, PI]);
        if self.front_range {
            low.push(0.0);
            high.push(self.sensor_r);
        }
        BoxSpace {
            low: Array1::from_vec(low),
            high: Array1::from_vec(high),
        }
    }

    /// Concatenate the map prefix, the target blocks and the obstacle block
    pub fn compose(
        &self,
        map_prefix: &[f64],
        targets: &[TargetFeatures],
        obstacle: &ObstacleFeatures,
    ) -> Result<Array1<f64>> {
        if map_prefix.len() != self.map_len() {
            return Err(TrackError::dimension_mismatch(
                format!("{} map values", self.map_len()),
                format!("{}", map_prefix.len()),
            ));
        }
        if targets.len() != self.num_targets {
            return Err(TrackError::dimension_mismatch(
                format!("{} targets", self.num_targets),
                format!("{}", targets.len()),
            ));
        }

        let mut state = Vec::with_capacity(self.len());
        state.extend_from_slice(map_prefix);
        for t in targets {
            state.extend([t.r, t.alpha]);
            if self.velocity != VelocityFeatures::None {
                state.extend([t.r_dot, t.alpha_dot]);
            }
            state.extend([t.logdet, flag(t.observed)]);
            if self.belief_blocked {
                state.push(flag(t.blocked));
            }
        }
        let (o_r, o_alpha) = obstacle.closest.unwrap_or((self.sensor_r, PI));
        state.extend([o_r, o_alpha]);
        if self.front_range {
            state.push(obstacle.front_range.unwrap_or(self.sensor_r));
        }
        Ok(Array1::from_vec(state))
    }

    /// Read target `i`'s block back out of a composed state
    pub fn decode_target(&self, state: &Array1<f64>, i: usize) -> TargetFeatures {
        let o = self.target_offset(i);
        let mut t = TargetFeatures {
            r: state[o],
            alpha: state[o + 1],
            ..Default::default()
        };
        if self.velocity != VelocityFeatures::None {
            t.r_dot = state[o + 2];
            t.alpha_dot = state[o + 3];
        }
        t.logdet = state[self.logdet_index(i)];
        t.observed = state[self.observed_index(i)] > 0.5;
        if self.belief_blocked {
            t.blocked = state[self.observed_index(i) + 1] > 0.5;
        }
        t
    }

    /// Egocentric image channels around `pose`, flattened
    pub fn map_prefix(&self, map: &dyn OccupancyMap, pose: &Pose) -> Vec<f64> {
        let im = self.im_size;
        match self.map {
            MapAugmentation::None => Vec::new(),
            MapAugmentation::Occupancy => {
                let local = map.local_map(im, pose, false);
                shift_occupancy(&local.map).iter().copied().collect()
            }
            MapAugmentation::OccupancyAndVisit => {
                let local = map.local_map(im, pose, true);
                let visit = local.visit.unwrap_or_else(|| Array2::zeros((im, im)));
                let mut prefix: Vec<f64> = shift_occupancy(&local.map).iter().copied().collect();
                prefix.extend(visit.iter().map(|v| v - 1.0));
                prefix
            }
            MapAugmentation::OccupancyAndSurroundings => {
                let local = map.local_map(im, pose, false);
                let surroundings = map.local_visit_map_surroundings(im, pose);
                let mut channels = vec![shift_occupancy(&local.map)];
                channels.extend(surroundings.crops.iter().map(|c| c.mapv(|v| v - 1.0)));
                interleave_channels(&channels)
            }
        }
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Occupancy in {0, 1} to {-1, 1}
fn shift_occupancy(map: &Array2<f64>) -> Array2<f64> {
    map.mapv(|v| (v - 0.5) * 2.0)
}

/// Flatten `C` equally sized `H x W` channels in `(W, H, C)` order, channel fastest
pub fn interleave_channels(channels: &[Array2<f64>]) -> Vec<f64> {
    let (h, w) = channels.first().map(|c| c.dim()).unwrap_or((0, 0));
    let mut out = Vec::with_capacity(channels.len() * h * w);
    for col in 0..w {
        for row in 0..h {
            out.extend(channels.iter().map(|c| c[[row, col]]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GridMap;
    use ndarray::array;

    fn layout(velocity: VelocityFeatures, blocked: bool, front: bool, map: MapAugmentation) -> StateLayout {
        StateLayout {
            num_targets: 2,
            velocity,
            belief_blocked: blocked,
            front_range: front,
            map,
            im_size: 4,
            sensor_r: 10.0,
            rel_speed_limit: 4.0,
        }
    }

    #[test]
    fn test_lengths_match_bounds() {
        for (l, expected) in [
            (layout(VelocityFeatures::None, false, false, MapAugmentation::None), 10),
            (layout(VelocityFeatures::Cartesian, false, false, MapAugmentation::None), 14),
            (layout(VelocityFeatures::Cartesian, false, false, MapAugmentation::Occupancy), 30),
            (layout(VelocityFeatures::Cartesian, false, false, MapAugmentation::OccupancyAndVisit), 46),
            (layout(VelocityFeatures::Cartesian, true, true, MapAugmentation::OccupancyAndSurroundings), 97),
        ] {
            assert_eq!(l.len(), expected);
            assert_eq!(l.bounds().len(), expected);
        }
    }

    #[test]
    fn test_no_obstacle_sentinel() {
        let l = layout(VelocityFeatures::None, false, true, MapAugmentation::None);
        let targets = [TargetFeatures::default(); 2];
        let s = l.compose(&[], &targets, &ObstacleFeatures::default()).unwrap();
        let o = l.obstacle_offset();
        assert_eq!(s[o], 10.0);
        assert_eq!(s[o + 1], PI);
        assert_eq!(s[o + 2], 10.0);
    }

    #[test]
    fn test_compose_decode() {
        let l = layout(VelocityFeatures::Cartesian, true, false, MapAugmentation::None);
        let agent = Pose::new(1.0, 2.0, 0.3);
        let belief = array![4.0, -1.0, 0.5, 0.5];
        let t = TargetFeatures {
            logdet: 3.0,
            observed: true,
            blocked: false,
            ..TargetFeatures::relative(&belief, &agent, (1.0, 0.0), VelocityFeatures::Cartesian)
        };
        let s = l
            .compose(&[], &[TargetFeatures::default(), t], &ObstacleFeatures::default())
            .unwrap();
        let back = l.decode_target(&s, 1);
        let (r, alpha) = relative_distance_polar([4.0, -1.0], agent.xy(), agent.theta);
        assert!((back.r - r).abs() < 1e-12);
        assert!((back.alpha - alpha).abs() < 1e-12);
        assert_eq!(back, t);
        assert_eq!(s[l.observed_index(1)], 1.0);
    }

    #[test]
    fn test_compose_rejects_wrong_prefix() {
        let l = layout(VelocityFeatures::None, false, false, MapAugmentation::Occupancy);
        let targets = [TargetFeatures::default(); 2];
        assert!(l.compose(&[0.0; 3], &targets, &ObstacleFeatures::default()).is_err());
        assert!(l.compose(&[0.0; 16], &targets[..1], &ObstacleFeatures::default()).is_err());
    }

    #[test]
    fn test_interleave_order() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[10.0, 20.0], [30.0, 40.0]];
        // Column-major over pixels, channel innermost
        assert_eq!(
            interleave_channels(&[a, b]),
            vec![1.0, 10.0, 3.0, 30.0, 2.0, 20.0, 4.0, 40.0]
        );
    }

    #[test]
    fn test_map_prefix_values_are_shifted() {
        let mut map = GridMap::empty([0.0, 0.0], [20.0, 20.0], 1.0).unwrap();
        map.add_rect_obstacle([11.0, 0.0], [12.0, 20.0]);
        let pose = Pose::new(10.0, 10.0, 0.0);
        for aug in [
            MapAugmentation::Occupancy,
            MapAugmentation::OccupancyAndVisit,
            MapAugmentation::OccupancyAndSurroundings,
        ] {
            let l = layout(VelocityFeatures::Cartesian, false, false, aug);
            let prefix = l.map_prefix(&map, &pose);
            assert_eq!(prefix.len(), l.map_len());
            assert!(prefix.iter().all(|v| (-1.0..=1.0).contains(v)));
            assert!(prefix.iter().any(|&v| v == 1.0));
        }
    }
}
