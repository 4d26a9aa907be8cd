//! # Occupancy Map Module
//!
//! The map is the environment's spatial query service: collision and occlusion tests,
//! nearest-obstacle lookup, egocentric crops for the image variants, and the decaying
//! visit-frequency grid. The orchestrator is its only writer, and only through
//! [`OccupancyMap::reset_visit_freq_map`] and [`OccupancyMap::update_visit_freq_map`].

use ndarray::Array2;

use crate::types::{Point2, Pose};

pub mod grid;

pub use grid::{GridMap, MapFile, SensorFootprint};

/// Egocentric crop around a pose
#[derive(Clone, Debug)]
pub struct LocalMap {
    /// Occupancy in {0, 1}; cells outside the map read as occupied
    pub map: Array2<f64>,
    /// Global position of the crop's first cell
    pub origin: Point2,
    /// Visit frequency in [0, 2] over the same cells, when requested
    pub visit: Option<Array2<f64>>,
}

/// Visit-frequency crops just outside the agent's own crop
#[derive(Clone, Debug)]
pub struct Surroundings {
    /// Front, back, left, right
    pub origins: [Point2; 4],
    pub crops: [Array2<f64>; 4],
}

/// Spatial queries consumed by the tracking core
pub trait OccupancyMap: Send {
    /// `false` for a map without obstacle data
    fn has_obstacles(&self) -> bool;

    /// Lower and upper corners of the map
    fn bounds(&self) -> (Point2, Point2);

    /// Default agent position when no obstacle data exists
    fn origin(&self) -> Point2;

    fn is_collision(&self, point: Point2) -> bool;

    /// `true` when an obstacle lies on the segment between `a` and `b`
    fn is_blocked(&self, a: Point2, b: Point2) -> bool;

    /// Range and bearing of the nearest obstacle inside the sector `(fov, r_max)`
    fn closest_obstacle(&self, pose: &Pose, fov: f64, r_max: f64) -> Option<(f64, f64)>;

    /// Range of the nearest obstacle within `half_angle` of the heading
    fn front_obstacle_range(&self, pose: &Pose, half_angle: f64, r_max: f64) -> Option<f64> {
        self.closest_obstacle(pose, 2.0 * half_angle, r_max).map(|(r, _)| r)
    }

    fn local_map(&self, im_size: usize, pose: &Pose, with_visit: bool) -> LocalMap;

    fn local_visit_map_surroundings(&self, im_size: usize, pose: &Pose) -> Surroundings;

    fn reset_visit_freq_map(&mut self);

    /// Decay the visit grid, then stamp the sensor footprint at `pose`
    fn update_visit_freq_map(&mut self, pose: &Pose, decay_factor: f64, observed: bool);
}
