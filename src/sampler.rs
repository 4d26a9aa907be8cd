//! Rejection sampling of jointly valid initial poses.
//!
//! One sample draws the agent, then for every target a belief pose relative to the
//! agent and a true pose relative to that belief. Every candidate must be
//! collision-free and match the requested occlusion state. A sub-sample that
//! exhausts its attempts discards the whole draw, agent included.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::EnvConfig;
use crate::geometry::{transform_2d_inv, wrap_around};
use crate::map::OccupancyMap;
use crate::types::{Pose, SimRng};

/// Attempts allowed per belief or target candidate before the draw restarts
pub const MAX_ATTEMPTS: usize = 100;

/// Restarts between two warnings about a hard-to-satisfy request
const RESTART_WARN_INTERVAL: usize = 1000;

/// Linear and angular windows of the relative placements
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplerRanges {
    pub lin_dist_range_a2b: (f64, f64),
    pub ang_dist_range_a2b: (f64, f64),
    pub lin_dist_range_b2t: (f64, f64),
    pub ang_dist_range_b2t: (f64, f64),
}

impl SamplerRanges {
    pub fn from_config(config: &EnvConfig) -> Self {
        SamplerRanges {
            lin_dist_range_a2b: config.lin_dist_range_a2b,
            ang_dist_range_a2b: config.ang_dist_range_a2b,
            lin_dist_range_b2t: config.lin_dist_range_b2t,
            ang_dist_range_b2t: config.ang_dist_range_b2t,
        }
    }
}

/// Initial poses of one episode; `beliefs[i]` and `targets[i]` belong to target `i`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitPose {
    pub agent: Pose,
    pub beliefs: Vec<Pose>,
    pub targets: Vec<Pose>,
}

pub struct InitPoseSampler<'a> {
    map: &'a dyn OccupancyMap,
}

impl<'a> InitPoseSampler<'a> {
    pub fn new(map: &'a dyn OccupancyMap) -> Self {
        InitPoseSampler { map }
    }

    /// Random pose at a polar offset from `frame`.
    ///
    /// The angular window is counter clockwise from `min` to `max` and wraps when
    /// `max < min`. The returned heading is the sampled angle plus the frame heading.
    /// `additional_frame` re-expresses the point from that frame into the global one.
    /// The flag reports whether the point is collision-free.
    pub fn gen_rand_pose(
        &self,
        frame: &Pose,
        lin_range: (f64, f64),
        ang_range: (f64, f64),
        additional_frame: Option<&Pose>,
        rng: &mut SimRng,
    ) -> (bool, Pose) {
        let (min_ang, mut max_ang) = ang_range;
        if max_ang < min_ang {
            max_ang += 2.0 * PI;
        }
        let rand_ang = wrap_around(rng.gen::<f64>() * (max_ang - min_ang) + min_ang);
        let rand_r = rng.gen::<f64>() * (lin_range.1 - lin_range.0) + lin_range.0;

        let local = [rand_r * rand_ang.cos(), rand_r * rand_ang.sin()];
        let mut global = transform_2d_inv(local, frame.theta, frame.xy());
        if let Some(extra) = additional_frame {
            global = transform_2d_inv(global, extra.theta, extra.xy());
        }
        let valid = !self.map.is_collision(global);
        (valid, Pose::new(global[0], global[1], rand_ang + frame.theta))
    }

    /// Draw a joint initial pose for `num_targets` targets.
    ///
    /// `blocked` fixes whether the agent's line of sight to every belief and target is
    /// occluded; `None` picks it at random for this episode. Without obstacle data the
    /// agent sits at the map origin and nothing is ever blocked.
    pub fn sample(
        &self,
        num_targets: usize,
        ranges: &SamplerRanges,
        blocked: Option<bool>,
        rng: &mut SimRng,
    ) -> InitPose {
        let blocked = if self.map.has_obstacles() {
            blocked.unwrap_or_else(|| rng.gen::<f64>() < 0.5)
        } else {
            false
        };

        let mut restarts = 0usize;
        loop {
            if let Some(pose) = self.try_sample(num_targets, ranges, blocked, rng) {
                log::debug!(
                    "initial pose sampled after {} restarts (blocked = {}): agent {:?}",
                    restarts,
                    blocked,
                    pose.agent
                );
                return pose;
            }
            restarts += 1;
            if restarts % RESTART_WARN_INTERVAL == 0 {
                log::warn!(
                    "initial pose sampling restarted {} times (blocked = {}, ranges = {:?})",
                    restarts,
                    blocked,
                    ranges
                );
            }
        }
    }

    /// Collision-free agent pose with a random heading; the map origin on an empty map
    pub fn sample_agent(&self, rng: &mut SimRng) -> Pose {
        let heading = rng.gen::<f64>() * 2.0 * PI - PI;
        if !self.map.has_obstacles() {
            let origin = self.map.origin();
            return Pose::new(origin[0], origin[1], heading);
        }
        let (lo, hi) = self.map.bounds();
        loop {
            let xy = [
                rng.gen::<f64>() * (hi[0] - lo[0]) + lo[0],
                rng.gen::<f64>() * (hi[1] - lo[1]) + lo[1],
            ];
            if !self.map.is_collision(xy) {
                return Pose::new(xy[0], xy[1], heading);
            }
        }
    }

    /// One outer draw; `None` when any sub-sample ran out of attempts
    fn try_sample(
        &self,
        num_targets: usize,
        ranges: &SamplerRanges,
        blocked: bool,
        rng: &mut SimRng,
    ) -> Option<InitPose> {
        let agent = self.sample_agent(rng);
        let mut beliefs = Vec::with_capacity(num_targets);
        let mut targets = Vec::with_capacity(num_targets);
        for _ in 0..num_targets {
            let belief = self.sample_relative(
                &agent,
                &agent,
                ranges.lin_dist_range_a2b,
                ranges.ang_dist_range_a2b,
                blocked,
                rng,
            )?;
            let target = self.sample_relative(
                &agent,
                &belief,
                ranges.lin_dist_range_b2t,
                ranges.ang_dist_range_b2t,
                blocked,
                rng,
            )?;
            beliefs.push(belief);
            targets.push(target);
        }
        Some(InitPose { agent, beliefs, targets })
    }

    fn sample_relative(
        &self,
        agent: &Pose,
        frame: &Pose,
        lin_range: (f64, f64),
        ang_range: (f64, f64),
        blocked: bool,
        rng: &mut SimRng,
    ) -> Option<Pose> {
        (0..MAX_ATTEMPTS).find_map(|_| {
            let (valid, pose) = self.gen_rand_pose(frame, lin_range, ang_range, None, rng);
            (valid && self.map.is_blocked(agent.xy(), pose.xy()) == blocked).then_some(pose)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;
    use crate::map::GridMap;
    use rand::SeedableRng;

    fn ranges(lin_a2b: (f64, f64), lin_b2t: (f64, f64)) -> SamplerRanges {
        SamplerRanges {
            lin_dist_range_a2b: lin_a2b,
            ang_dist_range_a2b: (-PI, PI),
            lin_dist_range_b2t: lin_b2t,
            ang_dist_range_b2t: (-PI, PI),
        }
    }

    fn maze() -> GridMap {
        let mut map = GridMap::empty([0.0, 0.0], [40.0, 40.0], 0.5).unwrap();
        map.add_rect_obstacle([19.0, 5.0], [21.0, 35.0]);
        map.add_rect_obstacle([5.0, 19.0], [35.0, 21.0]);
        map.with_margin2wall(0.5)
    }

    #[test]
    fn test_empty_map_uses_origin() {
        let map = GridMap::empty([-10.0, -10.0], [10.0, 10.0], 1.0).unwrap();
        let sampler = InitPoseSampler::new(&map);
        let mut rng = SimRng::seed_from_u64(0);
        let pose = sampler.sample(3, &ranges((5.0, 10.0), (0.0, 10.0)), Some(true), &mut rng);
        assert_eq!(pose.agent.xy(), [0.0, 0.0]);
        assert_eq!(pose.beliefs.len(), 3);
        assert_eq!(pose.targets.len(), 3);
    }

    #[test]
    fn test_linear_ranges_hold() {
        let map = maze();
        let sampler = InitPoseSampler::new(&map);
        let mut rng = SimRng::seed_from_u64(42);
        let r = ranges((1.0, 5.0), (0.0, 3.0));
        for _ in 0..1000 {
            let pose = sampler.sample(1, &r, Some(false), &mut rng);
            let d_ab = distance(pose.agent.xy(), pose.beliefs[0].xy());
            let d_bt = distance(pose.beliefs[0].xy(), pose.targets[0].xy());
            assert!((1.0 - 1e-9..=5.0 + 1e-9).contains(&d_ab));
            assert!(d_bt <= 3.0 + 1e-9);
        }
    }

    #[test]
    fn test_blocked_request_is_honored() {
        let map = maze();
        let sampler = InitPoseSampler::new(&map);
        let mut rng = SimRng::seed_from_u64(5);
        let r = ranges((5.0, 10.0), (0.0, 5.0));
        for blocked in [true, false] {
            for _ in 0..50 {
                let pose = sampler.sample(2, &r, Some(blocked), &mut rng);
                assert!(!map.is_collision(pose.agent.xy()));
                for (b, t) in pose.beliefs.iter().zip(&pose.targets) {
                    assert_eq!(map.is_blocked(pose.agent.xy(), b.xy()), blocked);
                    assert_eq!(map.is_blocked(pose.agent.xy(), t.xy()), blocked);
                    assert!(!map.is_collision(t.xy()));
                }
            }
        }
    }

    #[test]
    fn test_wrapped_angular_window() {
        let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
        let sampler = InitPoseSampler::new(&map);
        let mut rng = SimRng::seed_from_u64(8);
        let frame = Pose::new(0.0, 0.0, 0.0);
        // Window from 3pi/4 counter clockwise through pi to -3pi/4
        for _ in 0..200 {
            let (valid, pose) =
                sampler.gen_rand_pose(&frame, (2.0, 3.0), (3.0 * PI / 4.0, -3.0 * PI / 4.0), None, &mut rng);
            assert!(valid);
            assert!(pose.x < 0.0);
            assert!(pose.y.abs() <= pose.x.abs() + 1e-9);
        }
    }

    #[test]
    fn test_additional_frame_is_applied_last() {
        let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
        let sampler = InitPoseSampler::new(&map);
        let mut rng = SimRng::seed_from_u64(2);
        let frame = Pose::new(1.0, 0.0, 0.0);
        let extra = Pose::new(10.0, 10.0, PI / 2.0);
        let (_, pose) = sampler.gen_rand_pose(&frame, (0.0, 0.0), (0.0, 0.0), Some(&extra), &mut rng);
        // (1, 0) in the extra frame is (10, 11) globally
        assert!((pose.x - 10.0).abs() < 1e-9);
        assert!((pose.y - 11.0).abs() < 1e-9);
    }
}
