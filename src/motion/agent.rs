use super::se2_dynamics;
use crate::geometry::{distance, wrap_around};
use crate::map::OccupancyMap;
use crate::types::{Point2, Pose};

/// The tracking robot: an SE(2) unicycle confined to the map
#[derive(Clone, Debug)]
pub struct Agent {
    pose: Pose,
    sampling_period: f64,
    bounds: (Point2, Point2),
    /// Minimum separation kept from every target
    margin: f64,
}

impl Agent {
    pub fn new(sampling_period: f64, bounds: (Point2, Point2), margin: f64) -> Self {
        Agent {
            pose: Pose::default(),
            sampling_period,
            bounds,
            margin,
        }
    }

    pub fn reset(&mut self, pose: Pose) {
        self.pose = pose.wrapped();
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Apply `(v, w)` for one sampling period.
    ///
    /// A move into an obstacle is undone and reported as a collision. A move into the
    /// margin around a target is undone silently; the heading change is kept either way.
    pub fn update(&mut self, action: (f64, f64), target_positions: &[Point2], map: &dyn OccupancyMap) -> bool {
        let next = se2_dynamics([self.pose.x, self.pose.y, self.pose.theta], self.sampling_period, action);
        let mut new_pose = Pose::new(next[0], next[1], next[2]);
        let mut collided = false;
        if map.is_collision(new_pose.xy()) {
            collided = true;
            new_pose.x = self.pose.x;
            new_pose.y = self.pose.y;
        } else if target_positions
            .iter()
            .any(|&t| distance(new_pose.xy(), t) < self.margin)
        {
            new_pose.x = self.pose.x;
            new_pose.y = self.pose.y;
        }
        let (lo, hi) = self.bounds;
        new_pose.x = new_pose.x.clamp(lo[0], hi[0]);
        new_pose.y = new_pose.y.clamp(lo[1], hi[1]);
        new_pose.theta = wrap_around(new_pose.theta);
        self.pose = new_pose;
        collided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GridMap;
    use std::f64::consts::PI;

    fn walled() -> GridMap {
        let mut map = GridMap::empty([0.0, 0.0], [20.0, 20.0], 0.5).unwrap();
        map.add_rect_obstacle([9.0, 0.0], [11.0, 20.0]);
        map
    }

    #[test]
    fn test_free_motion() {
        let map = walled();
        let mut agent = Agent::new(0.5, map.bounds(), 1.0);
        agent.reset(Pose::new(2.0, 2.0, 0.0));
        assert!(!agent.update((2.0, 0.0), &[], &map));
        assert!((agent.pose().x - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_collision_reverts_position() {
        let map = walled();
        let mut agent = Agent::new(0.5, map.bounds(), 1.0);
        agent.reset(Pose::new(8.5, 5.0, 0.0));
        assert!(agent.update((3.0, PI / 2.0), &[], &map));
        assert_eq!(agent.pose().xy(), [8.5, 5.0]);
        assert!((agent.pose().theta - PI / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_target_margin_blocks_without_collision() {
        let map = walled();
        let mut agent = Agent::new(0.5, map.bounds(), 1.0);
        agent.reset(Pose::new(2.0, 2.0, 0.0));
        assert!(!agent.update((2.0, 0.0), &[[3.2, 2.0]], &map));
        assert_eq!(agent.pose().xy(), [2.0, 2.0]);
    }
}
