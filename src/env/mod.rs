//! # Tracking Environments
//!
//! [`TrackingEnv`] is the episode orchestrator. It owns the agent, the true targets
//! and one belief per target, draws all randomness from a single seeded generator,
//! and drives them through `reset` and `step` in the order fixed by the variant's
//! [`BeliefTiming`].
//!
//! ```no_run
//! use tracksim::env::make;
//!
//! let mut env = make("TargetTracking-v1", 2)?;
//! let state = env.reset()?;
//! let result = env.step(0)?;
//! assert_eq!(state.len(), result.state.len());
//! # Ok::<(), tracksim::error::TrackError>(())
//! ```

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use std::f64::consts::PI;

use crate::belief::BeliefFilter;
use crate::compose::{ObstacleFeatures, StateLayout, TargetFeatures};
use crate::config::EnvConfig;
use crate::error::{Result, TrackError};
use crate::map::OccupancyMap;
use crate::motion::{Agent, FixedPath, MotionContext, TargetDynamics};
use crate::observation::Sensor;
use crate::reward::{RewardInput, RewardKind};
use crate::sampler::{InitPose, InitPoseSampler, SamplerRanges};
use crate::types::{ActionSpace, BoxSpace, Point2, Pose, SimRng, StepInfo, StepResult};

pub mod builder;
pub mod variant;

pub use builder::{load_target_paths, EnvBuilder};
pub use variant::{BeliefTiming, DynamicsKind, FilterKind, ModelSetup, Variant, VariantProfile, VisitUpdate};

/// Half-angle of the sector searched for the front obstacle range
pub const FRONT_HALF_ANGLE: f64 = PI / 12.0;

/// Speed limits drawn when target parameters are randomized
const RANDOM_SPEED_LIMITS: [f64; 2] = [1.0, 3.0];
/// Process noise constants drawn when target parameters are randomized
const RANDOM_CONST_Q: [f64; 3] = [0.001, 0.1, 1.0];

/// Construct a variant from its id (`TargetTracking-v0` ... `TargetTracking-v9`)
pub fn make(name: &str, num_targets: usize) -> Result<TrackingEnv> {
    EnvBuilder::new(name.parse()?).num_targets(num_targets).build()
}

/// Target model parameters applied at reset
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetParams {
    Explicit { speed_limit: f64, const_q: f64 },
    /// Speed limit from {1, 3} and process noise from {0.001, 0.1, 1}
    Randomized,
}

/// Per-episode overrides for [`TrackingEnv::reset_with`]
#[derive(Clone, Debug, Default)]
pub struct ResetOptions {
    /// Skip the sampler and start from these poses
    pub init_pose: Option<InitPose>,
    /// Replace the targets by fixed trajectories for this and later episodes
    pub target_paths: Option<Vec<Array2<f64>>>,
    pub ranges: Option<SamplerRanges>,
    /// Occlusion between the agent and every belief and target; random when `None`
    pub blocked: Option<bool>,
    pub target_params: Option<TargetParams>,
}

pub(crate) struct EnvParts {
    pub variant: Variant,
    pub num_targets: usize,
    pub config: EnvConfig,
    pub map: Box<dyn OccupancyMap>,
    pub is_training: bool,
    pub known_noise: bool,
    pub reward: RewardKind,
    pub im_size: usize,
    pub paths: Option<Vec<Array2<f64>>>,
    pub rng: SimRng,
}

pub struct TrackingEnv {
    variant: Variant,
    profile: VariantProfile,
    config: EnvConfig,
    num_targets: usize,
    map: Box<dyn OccupancyMap>,
    agent: Agent,
    targets: Vec<Box<dyn TargetDynamics>>,
    beliefs: Vec<Box<dyn BeliefFilter>>,
    /// Trajectories replayed by the targets, when they follow fixed paths
    paths: Option<Vec<Array2<f64>>>,
    discovered: Vec<bool>,
    sensor: Sensor,
    layout: StateLayout,
    action_space: ActionSpace,
    reward: RewardKind,
    is_training: bool,
    known_noise: bool,
    speed_limit: f64,
    const_q: f64,
    num_collisions: usize,
    state: Array1<f64>,
    rng: SimRng,
}

impl TrackingEnv {
    pub(crate) fn new(parts: EnvParts) -> Result<Self> {
        let profile = parts.variant.profile();
        let config = parts.config;
        let bounds = parts.map.bounds();
        let layout = StateLayout {
            num_targets: parts.num_targets,
            velocity: profile.velocity,
            belief_blocked: profile.belief_blocked,
            front_range: profile.front_range,
            map: profile.map,
            im_size: parts.im_size,
            sensor_r: config.sensor_r,
            rel_speed_limit: config.rel_speed_limit(),
        };
        let mut env = TrackingEnv {
            variant: parts.variant,
            profile,
            agent: Agent::new(config.sampling_period, bounds, config.margin),
            sensor: Sensor::from_config(&config),
            action_space: ActionSpace::new(&config.action_v, &config.action_w),
            speed_limit: config.target_speed_limit,
            const_q: config.const_q,
            num_targets: parts.num_targets,
            map: parts.map,
            targets: Vec::new(),
            beliefs: Vec::new(),
            paths: parts.paths,
            discovered: vec![false; parts.num_targets],
            state: Array1::zeros(layout.len()),
            layout,
            reward: parts.reward,
            is_training: parts.is_training,
            known_noise: parts.known_noise,
            num_collisions: 0,
            rng: parts.rng,
            config,
        };
        env.build_models()?;
        Ok(env)
    }

    fn model_setup(&self) -> ModelSetup {
        ModelSetup {
            sampling_period: self.config.sampling_period,
            bounds: self.map.bounds(),
            speed_limit: self.speed_limit,
            const_q: self.const_q,
            const_q_true: self.config.const_q_true,
            known_noise: self.known_noise,
        }
    }

    /// (Re)create every target and belief from the current parameters
    fn build_models(&mut self) -> Result<()> {
        let setup = self.model_setup();
        self.targets = match &self.paths {
            Some(paths) => paths
                .iter()
                .take(self.num_targets)
                .map(|p| Box::new(FixedPath::new(p.clone())) as Box<dyn TargetDynamics>)
                .collect(),
            None => (0..self.num_targets)
                .map(|_| {
                    self.profile.dynamics.build(&setup).ok_or_else(|| {
                        TrackError::MissingPath(format!("{} targets follow fixed paths", self.variant))
                    })
                })
                .collect::<Result<_>>()?,
        };
        self.beliefs = (0..self.num_targets)
            .map(|_| self.profile.filter.build(&setup, self.sensor.noise_cov()))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn set_target_params(&mut self, params: TargetParams) -> Result<()> {
        let (speed_limit, const_q) = match params {
            TargetParams::Explicit { speed_limit, const_q } => (speed_limit, const_q),
            TargetParams::Randomized => (
                *RANDOM_SPEED_LIMITS.choose(&mut self.rng).unwrap_or(&RANDOM_SPEED_LIMITS[0]),
                *RANDOM_CONST_Q.choose(&mut self.rng).unwrap_or(&RANDOM_CONST_Q[0]),
            ),
        };
        if !(speed_limit > 0.0 && const_q >= 0.0) {
            return Err(TrackError::invalid_parameter(
                "target_params".to_string(),
                format!("speed limit {} and process noise {}", speed_limit, const_q),
            ));
        }
        log::debug!("target parameters: speed limit {}, process noise {}", speed_limit, const_q);
        self.speed_limit = speed_limit;
        self.const_q = const_q;
        self.build_models()
    }

    pub fn reset(&mut self) -> Result<Array1<f64>> {
        self.reset_with(ResetOptions::default())
    }

    pub fn reset_with(&mut self, options: ResetOptions) -> Result<Array1<f64>> {
        if let Some(paths) = options.target_paths {
            builder::check_paths(&paths, self.num_targets)?;
            self.paths = Some(paths);
            self.build_models()?;
        }
        if let Some(params) = options.target_params {
            self.set_target_params(params)?;
        }
        self.discovered.fill(false);
        self.num_collisions = 0;
        if self.profile.visit != VisitUpdate::None {
            self.map.reset_visit_freq_map();
        }

        let init = match options.init_pose {
            Some(pose) => {
                if pose.beliefs.len() != self.num_targets || pose.targets.len() != self.num_targets {
                    return Err(TrackError::dimension_mismatch(
                        format!("{} belief and target poses", self.num_targets),
                        format!("{} and {}", pose.beliefs.len(), pose.targets.len()),
                    ));
                }
                pose
            }
            None if self.profile.dynamics == DynamicsKind::FixedPath => self.path_init_pose(),
            None => {
                let ranges = options.ranges.unwrap_or_else(|| SamplerRanges::from_config(&self.config));
                InitPoseSampler::new(self.map.as_ref()).sample(self.num_targets, &ranges, options.blocked, &mut self.rng)
            }
        };

        self.agent.reset(init.agent);
        for i in 0..self.num_targets {
            let belief_state = self.profile.filter.init_state(&init.beliefs[i]);
            self.beliefs[i].reset(belief_state, self.config.target_init_cov);
            let target_state = match &self.paths {
                Some(paths) => paths[i].row(0).to_owned(),
                None => self.profile.dynamics.init_state(&init.targets[i], self.config.target_init_vel),
            };
            self.targets[i].reset(target_state);
        }
        log::debug!(
            "{} reset: agent {:?}, beliefs {:?}, targets {:?}",
            self.variant,
            init.agent,
            init.beliefs,
            init.targets
        );

        self.state = match self.profile.timing {
            BeliefTiming::PredictThenUpdate => {
                let observed = vec![false; self.num_targets];
                self.compose((0.0, 0.0), &observed, false)?
            }
            BeliefTiming::UpdateThenPredict => {
                let observed = self.observe_and_update()?;
                self.predict_all()?;
                self.compose((0.0, 0.0), &observed, true)?
            }
        };
        Ok(self.state.clone())
    }

    /// Agent sampled collision-free; beliefs scattered around each path start
    fn path_init_pose(&mut self) -> InitPose {
        let agent = InitPoseSampler::new(self.map.as_ref()).sample_agent(&mut self.rng);
        let spread = self.config.init_distance_belief;
        let mut beliefs = Vec::with_capacity(self.num_targets);
        let mut targets = Vec::with_capacity(self.num_targets);
        let starts: Vec<Point2> = match &self.paths {
            Some(paths) => paths.iter().take(self.num_targets).map(|p| [p[[0, 0]], p[[0, 1]]]).collect(),
            None => self.targets.iter().map(|t| t.position()).collect(),
        };
        for start in starts {
            let offset: [f64; 2] = [self.rng.gen::<f64>() - 0.5, self.rng.gen::<f64>() - 0.5];
            beliefs.push(Pose::new(start[0] + spread * offset[0], start[1] + spread * offset[1], 0.0));
            targets.push(Pose::new(start[0], start[1], 0.0));
        }
        InitPose { agent, beliefs, targets }
    }

    pub fn step(&mut self, action: usize) -> Result<StepResult> {
        let action_vw = self.action_space.decode(action)?;
        let positions: Vec<Point2> = self.targets.iter().map(|t| t.position()).collect();
        let collided = self.agent.update(action_vw, &positions, self.map.as_ref());
        if collided {
            self.num_collisions += 1;
        }
        let pose = self.agent.pose();

        let observed = match self.profile.timing {
            BeliefTiming::PredictThenUpdate => {
                let mut observed = Vec::with_capacity(self.num_targets);
                for i in 0..self.num_targets {
                    self.move_target(i, &pose);
                    let target = self.targets[i].position();
                    let obs = self.sensor.observe(&pose, target, self.map.as_ref(), &mut self.rng)?;
                    self.beliefs[i].predict(&mut self.rng)?;
                    if let Some(z) = obs.measurement {
                        self.beliefs[i].update(z, &pose, self.map.as_ref())?;
                        self.discovered[i] = true;
                    }
                    observed.push(obs.detected);
                }
                observed
            }
            BeliefTiming::UpdateThenPredict => {
                for i in 0..self.num_targets {
                    if !self.profile.discovery_gated || self.discovered[i] {
                        self.move_target(i, &pose);
                    }
                }
                self.observe_and_update()?
            }
        };

        let log_dets = self.log_dets()?;
        let obstacle = match self.reward {
            RewardKind::Shaped => self.map.closest_obstacle(&pose, 2.0 * PI, self.sensor.range),
            _ => None,
        };
        let outcome = self.reward.evaluate(
            &RewardInput {
                log_dets: &log_dets,
                collided,
                obstacle,
                observed: &observed,
            },
            &self.config.reward,
            self.config.margin2wall,
            self.is_training,
        );

        if self.profile.timing == BeliefTiming::UpdateThenPredict {
            self.predict_all()?;
        }
        self.state = self.compose(action_vw, &observed, true)?;
        log::trace!(
            "{} step: action {} {:?}, collided {}, observed {:?}, reward {:.4}",
            self.variant,
            action,
            action_vw,
            collided,
            observed,
            outcome.reward
        );

        Ok(StepResult {
            state: self.state.clone(),
            reward: outcome.reward,
            done: outcome.done,
            info: StepInfo {
                mean_nlogdetcov: outcome.mean_nlogdetcov,
            },
        })
    }

    fn move_target(&mut self, i: usize, agent: &Pose) {
        let ctx = MotionContext {
            map: self.map.as_ref(),
            reference: self.profile.dynamics.keeps_agent_margin().then(|| agent.xy()),
            margin: self.config.margin,
        };
        self.targets[i].update(&ctx, &mut self.rng);
    }

    /// Observe every target and fuse detections into the beliefs
    fn observe_and_update(&mut self) -> Result<Vec<bool>> {
        let pose = self.agent.pose();
        let mut observed = Vec::with_capacity(self.num_targets);
        for i in 0..self.num_targets {
            let target = self.targets[i].position();
            let obs = self.sensor.observe(&pose, target, self.map.as_ref(), &mut self.rng)?;
            if let Some(z) = obs.measurement {
                self.beliefs[i].update(z, &pose, self.map.as_ref())?;
                self.discovered[i] = true;
            }
            observed.push(obs.detected);
        }
        Ok(observed)
    }

    fn predict_all(&mut self) -> Result<()> {
        for belief in self.beliefs.iter_mut() {
            belief.predict(&mut self.rng)?;
        }
        Ok(())
    }

    fn log_dets(&self) -> Result<Vec<f64>> {
        self.beliefs.iter().map(|b| b.log_det_cov()).collect()
    }

    /// Build the state vector.
    ///
    /// `sensed` is false only right after a reset without an observation cycle: the
    /// obstacle block then holds the no-obstacle sentinel and the visit grid is left
    /// untouched.
    fn compose(&mut self, action_vw: (f64, f64), observed: &[bool], sensed: bool) -> Result<Array1<f64>> {
        let pose = self.agent.pose();
        let features = self
            .beliefs
            .iter()
            .zip(observed)
            .map(|(belief, &obs)| -> Result<TargetFeatures> {
                Ok(TargetFeatures {
                    logdet: belief.log_det_cov()?,
                    observed: obs,
                    blocked: self.layout.belief_blocked && self.map.is_blocked(pose.xy(), belief.position()),
                    ..TargetFeatures::relative(belief.state(), &pose, action_vw, self.layout.velocity)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let obstacle = if sensed {
            ObstacleFeatures {
                closest: self.map.closest_obstacle(&pose, 2.0 * PI, self.sensor.range),
                front_range: if self.layout.front_range {
                    self.map.front_obstacle_range(&pose, FRONT_HALF_ANGLE, self.sensor.range)
                } else {
                    None
                },
            }
        } else {
            ObstacleFeatures::default()
        };

        if sensed && self.profile.visit != VisitUpdate::None {
            self.update_visit_map(&pose, observed);
        }

        let prefix = self.layout.map_prefix(self.map.as_ref(), &pose);
        self.layout.compose(&prefix, &features, &obstacle)
    }

    /// Faster beliefs age the visit memory faster
    fn update_visit_map(&mut self, pose: &Pose, observed: &[bool]) {
        let speeds: Vec<f64> = self
            .beliefs
            .iter()
            .map(|b| {
                let s = b.state();
                if s.len() >= 4 {
                    s[2].hypot(s[3])
                } else {
                    0.0
                }
            })
            .collect();
        let mean_speed = speeds.iter().sum::<f64>() / speeds.len().max(1) as f64;
        let decay = (self.config.sampling_period * mean_speed / self.config.sensor_r * self.config.visit_decay_base.ln()).exp();
        let any_observed = self.profile.visit == VisitUpdate::Observed && observed.iter().any(|&o| o);
        self.map.update_visit_freq_map(pose, decay, any_observed);
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn profile(&self) -> &VariantProfile {
        &self.profile
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    pub fn agent_pose(&self) -> Pose {
        self.agent.pose()
    }

    pub fn target_states(&self) -> Vec<&Array1<f64>> {
        self.targets.iter().map(|t| t.state()).collect()
    }

    pub fn belief_states(&self) -> Vec<&Array1<f64>> {
        self.beliefs.iter().map(|b| b.state()).collect()
    }

    pub fn belief_covs(&self) -> Vec<&Array2<f64>> {
        self.beliefs.iter().map(|b| b.cov()).collect()
    }

    pub fn beliefs(&self) -> &[Box<dyn BeliefFilter>] {
        &self.beliefs
    }

    pub fn discovered(&self) -> &[bool] {
        &self.discovered
    }

    pub fn num_collisions(&self) -> usize {
        self.num_collisions
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    /// Declared state bounds, fixed at construction. Per-episode target parameters
    /// do not widen the relative-speed bounds.
    pub fn observation_space(&self) -> BoxSpace {
        self.layout.bounds()
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Last composed state
    pub fn state(&self) -> &Array1<f64> {
        &self.state
    }

    pub fn map(&self) -> &dyn OccupancyMap {
        self.map.as_ref()
    }

    /// Current target speed limit and process noise constant
    pub fn target_params(&self) -> (f64, f64) {
        (self.speed_limit, self.const_q)
    }
}
