use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{LocalMap, OccupancyMap, Surroundings};
use crate::error::{Result, TrackError};
use crate::geometry::{relative_distance_polar, transform_2d_inv};
use crate::types::{Point2, Pose};

/// Saturation value of the visit-frequency grid
const VISIT_MAX: f64 = 2.0;

/// Sensor sector stamped into the visit grid
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorFootprint {
    pub range: f64,
    /// Full field of view in radians
    pub fov: f64,
}

impl Default for SensorFootprint {
    fn default() -> Self {
        SensorFootprint {
            range: 10.0,
            fov: 120f64.to_radians(),
        }
    }
}

/// On-disk map description.
///
/// `rows[0]` is the top row (largest y). `#` and `1` mark occupied cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapFile {
    pub resolution: f64,
    pub mapmin: Point2,
    pub rows: Vec<String>,
}

/// Axis-aligned occupancy grid indexed `[ix, iy]`
#[derive(Clone, Debug)]
pub struct GridMap {
    mapmin: Point2,
    mapmax: Point2,
    res: f64,
    /// `None` when the map carries no obstacle data
    cells: Option<Array2<u8>>,
    visit: Array2<f64>,
    margin2wall: f64,
    footprint: SensorFootprint,
}

impl GridMap {
    /// Obstacle-free map spanning `[mapmin, mapmax]`
    pub fn empty(mapmin: Point2, mapmax: Point2, res: f64) -> Result<Self> {
        check_resolution(res)?;
        if !(mapmax[0] > mapmin[0] && mapmax[1] > mapmin[1]) {
            return Err(TrackError::invalid_parameter(
                "mapmax".to_string(),
                format!("must exceed mapmin {:?}, got {:?}", mapmin, mapmax),
            ));
        }
        let (nx, ny) = grid_shape(mapmin, mapmax, res);
        Ok(GridMap {
            mapmin,
            mapmax,
            res,
            cells: None,
            visit: Array2::zeros((nx, ny)),
            margin2wall: 0.0,
            footprint: SensorFootprint::default(),
        })
    }

    /// Occupancy grid from cells indexed `[ix, iy]`, nonzero meaning occupied
    pub fn from_cells(mapmin: Point2, res: f64, cells: Array2<u8>) -> Result<Self> {
        check_resolution(res)?;
        let (nx, ny) = cells.dim();
        if nx == 0 || ny == 0 {
            return Err(TrackError::invalid_parameter("cells", "map grid is empty"));
        }
        let mapmax = [mapmin[0] + nx as f64 * res, mapmin[1] + ny as f64 * res];
        Ok(GridMap {
            mapmin,
            mapmax,
            res,
            cells: Some(cells),
            visit: Array2::zeros((nx, ny)),
            margin2wall: 0.0,
            footprint: SensorFootprint::default(),
        })
    }

    pub fn from_map_file(file: &MapFile) -> Result<Self> {
        let ny = file.rows.len();
        let nx = file.rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if file.rows.iter().any(|r| r.chars().count() != nx) {
            return Err(TrackError::invalid_parameter("rows", "all map rows must have the same width"));
        }
        let mut cells = Array2::<u8>::zeros((nx, ny));
        for (row_idx, row) in file.rows.iter().enumerate() {
            let iy = ny - 1 - row_idx;
            for (ix, ch) in row.chars().enumerate() {
                if ch == '#' || ch == '1' {
                    cells[[ix, iy]] = 1;
                }
            }
        }
        GridMap::from_cells(file.mapmin, file.resolution, cells)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let file: MapFile = serde_json::from_str(&text)?;
        GridMap::from_map_file(&file)
    }

    pub fn with_margin2wall(mut self, margin: f64) -> Self {
        self.margin2wall = margin;
        self
    }

    pub fn with_sensor_footprint(mut self, footprint: SensorFootprint) -> Self {
        self.footprint = footprint;
        self
    }

    /// Mark every cell whose center lies in the rectangle as occupied
    pub fn add_rect_obstacle(&mut self, min: Point2, max: Point2) {
        let (nx, ny) = self.visit.dim();
        let cells = self.cells.get_or_insert_with(|| Array2::zeros((nx, ny)));
        for ix in 0..nx {
            for iy in 0..ny {
                let cx = self.mapmin[0] + (ix as f64 + 0.5) * self.res;
                let cy = self.mapmin[1] + (iy as f64 + 0.5) * self.res;
                if cx >= min[0] && cx <= max[0] && cy >= min[1] && cy <= max[1] {
                    cells[[ix, iy]] = 1;
                }
            }
        }
    }

    pub fn resolution(&self) -> f64 {
        self.res
    }

    pub fn visit_freq_map(&self) -> &Array2<f64> {
        &self.visit
    }

    fn cell_of(&self, p: Point2) -> Option<(usize, usize)> {
        let fx = (p[0] - self.mapmin[0]) / self.res;
        let fy = (p[1] - self.mapmin[1]) / self.res;
        if fx < 0.0 || fy < 0.0 || !fx.is_finite() || !fy.is_finite() {
            return None;
        }
        let (ix, iy) = (fx.floor() as usize, fy.floor() as usize);
        let (nx, ny) = self.visit.dim();
        if ix < nx && iy < ny {
            Some((ix, iy))
        } else {
            None
        }
    }

    fn cell_center(&self, ix: usize, iy: usize) -> Point2 {
        [
            self.mapmin[0] + (ix as f64 + 0.5) * self.res,
            self.mapmin[1] + (iy as f64 + 0.5) * self.res,
        ]
    }

    /// Index window of cells overlapping the square of half-width `radius` around `p`
    fn window(&self, p: Point2, radius: f64) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let (nx, ny) = self.visit.dim();
        let lo = |v: f64, min: f64| (((v - radius - min) / self.res).floor().max(0.0)) as usize;
        let hi = |v: f64, min: f64, n: usize| {
            ((((v + radius - min) / self.res).floor() + 1.0).max(0.0) as usize).min(n)
        };
        (
            lo(p[0], self.mapmin[0]).min(nx)..hi(p[0], self.mapmin[0], nx),
            lo(p[1], self.mapmin[1]).min(ny)..hi(p[1], self.mapmin[1], ny),
        )
    }

    /// Occupancy at a point; outside the map counts as occupied
    fn occupancy_at(&self, p: Point2) -> f64 {
        match self.cell_of(p) {
            None => 1.0,
            Some((ix, iy)) => match &self.cells {
                Some(cells) if cells[[ix, iy]] != 0 => 1.0,
                _ => 0.0,
            },
        }
    }

    fn visit_at(&self, p: Point2) -> f64 {
        self.cell_of(p).map(|(ix, iy)| self.visit[[ix, iy]]).unwrap_or(0.0)
    }

    /// Sample an egocentric `im_size x im_size` patch; `[i, j]` is `i` cells forward, `j` left
    fn sample_patch<F>(&self, im_size: usize, pose: &Pose, shift: Point2, value: F) -> (Array2<f64>, Point2)
    where
        F: Fn(Point2) -> f64,
    {
        let half = (im_size as f64 - 1.0) / 2.0;
        let offset = |i: usize, j: usize| {
            [
                (i as f64 - half) * self.res + shift[0],
                (j as f64 - half) * self.res + shift[1],
            ]
        };
        let patch = Array2::from_shape_fn((im_size, im_size), |(i, j)| {
            value(transform_2d_inv(offset(i, j), pose.theta, pose.xy()))
        });
        (patch, transform_2d_inv(offset(0, 0), pose.theta, pose.xy()))
    }
}

fn check_resolution(res: f64) -> Result<()> {
    if res > 0.0 && res.is_finite() {
        Ok(())
    } else {
        Err(TrackError::invalid_parameter(
            "resolution".to_string(),
            format!("must be positive, got {}", res),
        ))
    }
}

fn grid_shape(mapmin: Point2, mapmax: Point2, res: f64) -> (usize, usize) {
    let nx = ((mapmax[0] - mapmin[0]) / res).ceil().max(1.0) as usize;
    let ny = ((mapmax[1] - mapmin[1]) / res).ceil().max(1.0) as usize;
    (nx, ny)
}

impl OccupancyMap for GridMap {
    fn has_obstacles(&self) -> bool {
        self.cells.is_some()
    }

    fn bounds(&self) -> (Point2, Point2) {
        (self.mapmin, self.mapmax)
    }

    fn origin(&self) -> Point2 {
        [
            (self.mapmin[0] + self.mapmax[0]) / 2.0,
            (self.mapmin[1] + self.mapmax[1]) / 2.0,
        ]
    }

    fn is_collision(&self, point: Point2) -> bool {
        let cells = match &self.cells {
            None => return false,
            Some(cells) => cells,
        };
        let (ix, iy) = match self.cell_of(point) {
            None => return true,
            Some(c) => c,
        };
        if cells[[ix, iy]] != 0 {
            return true;
        }
        if self.margin2wall <= 0.0 {
            return false;
        }
        let (xs, ys) = self.window(point, self.margin2wall);
        for jx in xs {
            for jy in ys.clone() {
                if cells[[jx, jy]] == 0 {
                    continue;
                }
                // Distance from the point to the cell's square
                let c = self.cell_center(jx, jy);
                let dx = ((point[0] - c[0]).abs() - self.res / 2.0).max(0.0);
                let dy = ((point[1] - c[1]).abs() - self.res / 2.0).max(0.0);
                if dx.hypot(dy) < self.margin2wall {
                    return true;
                }
            }
        }
        false
    }

    fn is_blocked(&self, a: Point2, b: Point2) -> bool {
        if self.cells.is_none() {
            return false;
        }
        let length = (b[0] - a[0]).hypot(b[1] - a[1]);
        let n = ((length / (0.5 * self.res)).ceil() as usize).max(1);
        (0..=n).any(|k| {
            let t = k as f64 / n as f64;
            let p = [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];
            self.occupancy_at(p) > 0.0
        })
    }

    fn closest_obstacle(&self, pose: &Pose, fov: f64, r_max: f64) -> Option<(f64, f64)> {
        let cells = self.cells.as_ref()?;
        let (xs, ys) = self.window(pose.xy(), r_max);
        let mut best: Option<(f64, f64)> = None;
        for ix in xs {
            for iy in ys.clone() {
                if cells[[ix, iy]] == 0 {
                    continue;
                }
                let (r, alpha) = relative_distance_polar(self.cell_center(ix, iy), pose.xy(), pose.theta);
                if r <= r_max && alpha.abs() <= fov / 2.0 && best.map_or(true, |(rb, _)| r < rb) {
                    best = Some((r, alpha));
                }
            }
        }
        best
    }

    fn local_map(&self, im_size: usize, pose: &Pose, with_visit: bool) -> LocalMap {
        let (map, origin) = self.sample_patch(im_size, pose, [0.0, 0.0], |p| self.occupancy_at(p));
        let visit = if with_visit {
            Some(self.sample_patch(im_size, pose, [0.0, 0.0], |p| self.visit_at(p)).0)
        } else {
            None
        };
        LocalMap { map, origin, visit }
    }

    fn local_visit_map_surroundings(&self, im_size: usize, pose: &Pose) -> Surroundings {
        let d = im_size as f64 * self.res;
        let shifts = [[d, 0.0], [-d, 0.0], [0.0, d], [0.0, -d]];
        let patches = shifts.map(|shift| self.sample_patch(im_size, pose, shift, |p| self.visit_at(p)));
        Surroundings {
            origins: [patches[0].1, patches[1].1, patches[2].1, patches[3].1],
            crops: patches.map(|(crop, _)| crop),
        }
    }

    fn reset_visit_freq_map(&mut self) {
        self.visit.fill(0.0);
    }

    fn update_visit_freq_map(&mut self, pose: &Pose, decay_factor: f64, observed: bool) {
        self.visit.mapv_inplace(|v| v * decay_factor);

        let footprint = self.footprint;
        let own_cell = self.cell_of(pose.xy());
        let (xs, ys) = self.window(pose.xy(), footprint.range);
        for ix in xs {
            for iy in ys.clone() {
                let (r, alpha) = relative_distance_polar(self.cell_center(ix, iy), pose.xy(), pose.theta);
                let in_sector = r <= footprint.range && alpha.abs() <= footprint.fov / 2.0;
                if in_sector || own_cell == Some((ix, iy)) {
                    stamp(&mut self.visit[[ix, iy]], observed);
                }
            }
        }
    }
}

fn stamp(cell: &mut f64, observed: bool) {
    *cell = if observed { VISIT_MAX } else { (*cell + 1.0).min(VISIT_MAX) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// 20x20 m map with a vertical wall at x in [9, 11], y in [0, 15]
    fn walled_map() -> GridMap {
        let mut map = GridMap::empty([0.0, 0.0], [20.0, 20.0], 0.5).unwrap();
        map.add_rect_obstacle([9.0, 0.0], [11.0, 15.0]);
        map.with_margin2wall(0.5)
    }

    #[test]
    fn test_empty_map_never_collides() {
        let map = GridMap::empty([-10.0, -10.0], [10.0, 10.0], 1.0).unwrap();
        assert!(!map.has_obstacles());
        assert!(!map.is_collision([100.0, 100.0]));
        assert!(!map.is_blocked([-9.0, -9.0], [9.0, 9.0]));
        assert!(map.closest_obstacle(&Pose::default(), 2.0 * PI, 100.0).is_none());
        assert_eq!(map.origin(), [0.0, 0.0]);
    }

    #[test]
    fn test_non_positive_resolution_is_rejected() {
        for res in [0.0, -1.0, f64::NAN] {
            let err = GridMap::empty([0.0, 0.0], [10.0, 10.0], res);
            assert!(matches!(err, Err(TrackError::InvalidParameter { .. })), "{res}");
            assert!(GridMap::from_cells([0.0, 0.0], res, Array2::zeros((2, 2))).is_err());
        }
        assert!(GridMap::empty([5.0, 0.0], [5.0, 10.0], 1.0).is_err());
    }

    #[test]
    fn test_collision_and_margin() {
        let map = walled_map();
        assert!(map.is_collision([10.0, 5.0]));
        assert!(map.is_collision([8.7, 5.0]));
        assert!(!map.is_collision([7.0, 5.0]));
        assert!(map.is_collision([-1.0, 5.0]));
    }

    #[test]
    fn test_blocked_line_of_sight() {
        let map = walled_map();
        assert!(map.is_blocked([5.0, 5.0], [15.0, 5.0]));
        assert!(!map.is_blocked([5.0, 18.0], [15.0, 18.0]));
        assert!(!map.is_blocked([2.0, 2.0], [6.0, 8.0]));
    }

    #[test]
    fn test_closest_obstacle_respects_fov() {
        let map = walled_map();
        let facing_wall = Pose::new(6.0, 5.0, 0.0);
        let (r, alpha) = map.closest_obstacle(&facing_wall, PI / 2.0, 10.0).unwrap();
        assert!((r - 3.25).abs() < 0.3);
        assert!(alpha.abs() < 0.1);

        let facing_away = Pose::new(6.0, 5.0, PI);
        assert!(map.closest_obstacle(&facing_away, PI / 2.0, 10.0).is_none());
        assert!(map.front_obstacle_range(&facing_wall, 0.2, 10.0).is_some());
    }

    #[test]
    fn test_local_map_is_egocentric() {
        let map = walled_map();
        // Facing the wall: cells ahead are occupied, cells behind are free
        let pose = Pose::new(8.0, 5.0, 0.0);
        let local = map.local_map(9, &pose, true);
        assert_eq!(local.map.dim(), (9, 9));
        assert_eq!(local.map[[8, 4]], 1.0);
        assert_eq!(local.map[[0, 4]], 0.0);
        assert!(local.visit.is_some());

        // Turned left, the wall is on the right-hand side (j < center)
        let pose = Pose::new(8.0, 5.0, PI / 2.0);
        let local = map.local_map(9, &pose, false);
        assert_eq!(local.map[[4, 0]], 1.0);
        assert_eq!(local.map[[4, 8]], 0.0);
        assert!(local.visit.is_none());
    }

    #[test]
    fn test_visit_map_decay_and_stamp() {
        let mut map = GridMap::empty([0.0, 0.0], [20.0, 20.0], 1.0).unwrap().with_sensor_footprint(SensorFootprint {
            range: 3.0,
            fov: PI / 2.0,
        });
        let pose = Pose::new(10.0, 10.0, 0.0);
        map.update_visit_freq_map(&pose, 0.5, false);
        assert_eq!(map.visit_freq_map()[[10, 10]], 1.0);
        assert_eq!(map.visit_freq_map()[[12, 10]], 1.0);
        // Behind the agent, outside the footprint
        assert_eq!(map.visit_freq_map()[[7, 10]], 0.0);

        map.update_visit_freq_map(&Pose::new(2.0, 2.0, 0.0), 0.5, false);
        assert_eq!(map.visit_freq_map()[[12, 10]], 0.5);

        map.update_visit_freq_map(&pose, 1.0, true);
        assert_eq!(map.visit_freq_map()[[12, 10]], 2.0);

        map.reset_visit_freq_map();
        assert!(map.visit_freq_map().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_surroundings_layout() {
        let mut map = GridMap::empty([0.0, 0.0], [40.0, 40.0], 1.0).unwrap().with_sensor_footprint(SensorFootprint {
            range: 8.0,
            fov: 2.0 * PI,
        });
        let pose = Pose::new(20.0, 20.0, 0.0);
        map.update_visit_freq_map(&pose, 1.0, false);
        let s = map.local_visit_map_surroundings(4, &pose);
        // The front crop begins just ahead of the agent's own crop and sees the stamp
        assert!(s.crops[0].iter().any(|&v| v > 0.0));
        assert!(s.origins[0][0] > pose.x);
        assert!(s.origins[1][0] < pose.x);
        assert!(s.origins[2][1] > pose.y);
        assert!(s.origins[3][1] < pose.y);
    }

    #[test]
    fn test_map_file_orientation() {
        let file = MapFile {
            resolution: 1.0,
            mapmin: [0.0, 0.0],
            rows: vec!["#...".to_string(), "....".to_string()],
        };
        let map = GridMap::from_map_file(&file).unwrap();
        // Top-left character is the cell at the largest y
        assert!(map.is_collision([0.5, 1.5]));
        assert!(!map.is_collision([0.5, 0.5]));
        assert_eq!(map.bounds(), ([0.0, 0.0], [4.0, 2.0]));
    }
}
