use ndarray::Array2;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};

use super::variant::{DynamicsKind, Variant};
use super::TrackingEnv;
use crate::config::EnvConfig;
use crate::error::{Result, TrackError};
use crate::map::{GridMap, SensorFootprint};
use crate::reward::RewardKind;
use crate::types::SimRng;

/// Half-width of the obstacle-free square used when no map is given
const DEFAULT_MAP_HALF_WIDTH: f64 = 50.0;

/// Builder for [`TrackingEnv`]
pub struct EnvBuilder {
    variant: Variant,
    num_targets: usize,
    config: EnvConfig,
    map: Option<GridMap>,
    map_path: Option<PathBuf>,
    is_training: bool,
    known_noise: bool,
    seed: Option<u64>,
    reward: RewardKind,
    im_size: Option<usize>,
    target_paths: Option<Vec<Array2<f64>>>,
    target_path_dir: Option<PathBuf>,
}

impl EnvBuilder {
    pub fn new(variant: Variant) -> Self {
        EnvBuilder {
            variant,
            num_targets: 1,
            config: EnvConfig::default(),
            map: None,
            map_path: None,
            is_training: true,
            known_noise: true,
            seed: None,
            reward: RewardKind::default(),
            im_size: None,
            target_paths: None,
            target_path_dir: None,
        }
    }

    pub fn num_targets(mut self, n: usize) -> Self {
        self.num_targets = n;
        self
    }

    pub fn config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn map(mut self, map: GridMap) -> Self {
        self.map = Some(map);
        self
    }

    /// Load the map from a JSON map file at build time
    pub fn map_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.map_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Training mode skips the evaluation-only uncertainty metric
    pub fn training(mut self, is_training: bool) -> Self {
        self.is_training = is_training;
        self
    }

    /// When `false`, the true targets use a process noise the beliefs do not model
    pub fn known_noise(mut self, known: bool) -> Self {
        self.known_noise = known;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn reward(mut self, reward: RewardKind) -> Self {
        self.reward = reward;
        self
    }

    /// Side length of the egocentric crops, in cells
    pub fn im_size(mut self, im_size: usize) -> Self {
        self.im_size = Some(im_size);
        self
    }

    /// In-memory `T x 4` trajectories `(x, y, vx, vy)`, one per target
    pub fn target_paths(mut self, paths: Vec<Array2<f64>>) -> Self {
        self.target_paths = Some(paths);
        self
    }

    /// Directory holding `path_1.json`, `path_2.json`, ...
    pub fn target_path_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.target_path_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Result<TrackingEnv> {
        self.config.validate()?;
        if self.num_targets == 0 {
            return Err(TrackError::invalid_parameter("num_targets", "at least one target is required"));
        }
        let profile = self.variant.profile();
        let im_size = self.im_size.unwrap_or(profile.default_im_size);
        if im_size == 0 {
            return Err(TrackError::invalid_parameter("im_size", "image size must be positive"));
        }

        let paths = if profile.dynamics == DynamicsKind::FixedPath {
            let paths = match (self.target_paths, &self.target_path_dir) {
                (Some(paths), _) => paths,
                (None, Some(dir)) => load_target_paths(dir, self.num_targets)?,
                (None, None) => {
                    return Err(TrackError::MissingPath(format!(
                        "{} needs a target path per target",
                        self.variant
                    )))
                }
            };
            check_paths(&paths, self.num_targets)?;
            Some(paths)
        } else {
            None
        };

        let map = match (self.map, &self.map_path) {
            (Some(map), _) => map,
            (None, Some(path)) => GridMap::from_json_file(path)?,
            (None, None) => GridMap::empty(
                [-DEFAULT_MAP_HALF_WIDTH, -DEFAULT_MAP_HALF_WIDTH],
                [DEFAULT_MAP_HALF_WIDTH, DEFAULT_MAP_HALF_WIDTH],
                1.0,
            )?,
        };
        let map = map
            .with_margin2wall(self.config.margin2wall)
            .with_sensor_footprint(SensorFootprint {
                range: self.config.sensor_r,
                fov: self.config.fov_rad(),
            });

        let rng = match self.seed {
            Some(seed) => SimRng::seed_from_u64(seed),
            None => SimRng::from_entropy(),
        };

        log::debug!(
            "building {} with {} targets (training = {}, known noise = {})",
            self.variant,
            self.num_targets,
            self.is_training,
            self.known_noise
        );

        TrackingEnv::new(super::EnvParts {
            variant: self.variant,
            num_targets: self.num_targets,
            config: self.config,
            map: Box::new(map),
            is_training: self.is_training,
            known_noise: self.known_noise,
            reward: self.reward,
            im_size,
            paths,
            rng,
        })
    }
}

/// Fixed paths must be non-empty `T x 4` matrices, at least one per target
pub(crate) fn check_paths(paths: &[Array2<f64>], num_targets: usize) -> Result<()> {
    if paths.len() < num_targets {
        return Err(TrackError::MissingPath(format!(
            "{} paths for {} targets",
            paths.len(),
            num_targets
        )));
    }
    for path in paths {
        if path.nrows() == 0 || path.ncols() != 4 {
            return Err(TrackError::dimension_mismatch(
                "T x 4 path with T > 0".to_string(),
                format!("{} x {}", path.nrows(), path.ncols()),
            ));
        }
    }
    Ok(())
}

/// Read `path_{i}.json` (a list of `[x, y, vx, vy]` rows) for `i` in `1..=num_targets`
pub fn load_target_paths<P: AsRef<Path>>(dir: P, num_targets: usize) -> Result<Vec<Array2<f64>>> {
    (1..=num_targets)
        .map(|i| {
            let file = dir.as_ref().join(format!("path_{i}.json"));
            let text = fs::read_to_string(&file)
                .map_err(|e| TrackError::MissingPath(format!("{}: {}", file.display(), e)))?;
            let rows: Vec<[f64; 4]> = serde_json::from_str(&text)?;
            let flat: Vec<f64> = rows.iter().flatten().copied().collect();
            Array2::from_shape_vec((rows.len(), 4), flat)
                .map_err(|e| TrackError::SerializationError(e.to_string()))
        })
        .collect()
}
