//! Range-only beacon localization toolbox.
//!
//! This crate estimates the unknown 2D position of a moving agent from noisy
//! range measurements to one or more fixed beacons, using three
//! interchangeable recursive Bayesian estimators:
//!
//! - [`ekf::ExtendedKalmanFilter`] — mean and 2x2 covariance, with the range
//!   measurement linearized per beacon. Cheapest per cycle, fragile when the
//!   posterior is far from Gaussian (a single beacon constrains the agent to
//!   a ring, not a point).
//! - [`particle::ParticleFilter`] — N weighted position hypotheses with a
//!   bootstrap proposal and systematic resampling. Handles multimodal
//!   posteriors at a per-cycle cost linear in N.
//! - [`grid::GridFilter`] — a discretized belief over a fixed lattice,
//!   predicted by bounded-radius motion-kernel convolution and updated by
//!   per-cell likelihood multiplication. The most expressive and by far the
//!   most expensive of the three.
//!
//! All three consume the same control input and measurement vector each
//! discrete timestep; [`driver::FilterBank`] sequences them in lockstep so
//! their estimates can be compared step for step. The measurement semantics
//! live once, in [`model::RangeSensor`], so every filter weighs evidence the
//! same way.
//!
//! Every stochastic component draws from a seeded generator owned by its
//! run: the same seed and the same input sequence reproduce a trajectory bit
//! for bit, which is what the benchmarking harness in [`sim`] relies on.
//!
//! The filters are synchronous, perform no I/O, and hold no shared or global
//! state; concurrency (if any) belongs to the caller.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::{Matrix2, Vector2};
//! use rangenav::driver::FilterBank;
//! use rangenav::ekf::{ExtendedKalmanFilter, ProcessNoiseModel};
//! use rangenav::grid::GridFilter;
//! use rangenav::model::RangeSensor;
//! use rangenav::particle::ParticleFilter;
//!
//! let sensor = RangeSensor::new(vec![Vector2::new(600.0, 400.0)], 20.0);
//! let start = Vector2::new(700.0, 250.0);
//! let mut bank = FilterBank::new(
//!     ExtendedKalmanFilter::new(
//!         start,
//!         Matrix2::identity() * 100.0,
//!         sensor.clone(),
//!         ProcessNoiseModel::default(),
//!     ),
//!     ParticleFilter::new_with_seed(200, 1200.0, 800.0, 42),
//!     GridFilter::new(1200.0, 800.0, 20.0, start, 40.0),
//!     sensor,
//! );
//!
//! // One cycle: commanded velocity, one range per beacon, timestep.
//! let estimates = bank.step(Vector2::new(50.0, 0.0), &[180.0], 0.05).unwrap();
//! assert!(estimates.ekf.x.is_finite());
//! ```

pub mod driver;
pub mod ekf;
pub mod errors;
pub mod grid;
pub mod model;
pub mod particle;
pub mod sim;

pub use errors::FilterError;
