//! # tracksim - Multi-Target Tracking Environments
//!
//! tracksim simulates a mobile sensing agent that tracks moving targets with
//! belief filters. Each environment keeps one Kalman or unscented belief per
//! target and summarizes the beliefs, the obstacle layout and optionally
//! egocentric map images in a fixed-length state vector for a learning agent.
//!
//! ## Key Features
//!
//! - **Ten variants**: random-walk, double-integrator, fixed-path and SE(2) targets
//! - **Belief filters**: linear/extended Kalman and unscented Kalman filters
//! - **Maps**: occupancy grids with line-of-sight checks and visit-frequency memory
//! - **Reproducible**: a single seeded generator drives every random draw
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tracksim::env::{EnvBuilder, Variant};
//!
//! let mut env = EnvBuilder::new(Variant::V5).num_targets(2).seed(7).build()?;
//! let mut state = env.reset()?;
//! for _ in 0..100 {
//!     let result = env.step(1)?;
//!     state = result.state;
//! }
//! assert_eq!(state.len(), env.observation_space().len());
//! # Ok::<(), tracksim::error::TrackError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`belief`] - Belief filters over target states
//! - [`compose`] - State-vector layouts and bounds
//! - [`config`] - Environment constants, loadable from JSON
//! - [`env`] - Variants, the builder and the episode orchestrator
//! - [`error`] - Error types and result handling
//! - [`geometry`] - Planar frames and polar conversions
//! - [`linalg`] - Small dense linear algebra helpers
//! - [`map`] - Occupancy maps and visit-frequency memory
//! - [`motion`] - Agent and target motion models
//! - [`observation`] - Range-bearing sensor
//! - [`reward`] - Uncertainty-based rewards
//! - [`sampler`] - Initial pose sampling
//! - [`types`] - Shared value types

pub mod belief;
pub mod compose;
pub mod config;
pub mod env;
pub mod error;
pub mod geometry;
pub mod linalg;
pub mod map;
pub mod motion;
pub mod observation;
pub mod reward;
pub mod sampler;
pub mod types;

pub use env::{make, EnvBuilder, ResetOptions, TargetParams, TrackingEnv, Variant};
pub use error::{Result, TrackError};
