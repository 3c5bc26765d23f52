//! Shared motion and measurement semantics.
//!
//! All three filters observe the same thing: one noisy range per fixed
//! beacon. [`RangeSensor`] bundles the beacon set and the sensor noise and
//! provides the expected-range vector, the range Jacobian used by the EKF,
//! and the multi-beacon Gaussian likelihood used by both the particle filter
//! and the grid filter. Keeping the likelihood in one place guarantees that
//! the two sampled filters weigh evidence identically, which keeps their
//! RMSE comparison fair.

use nalgebra::{DMatrix, DVector, Vector2};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::errors::FilterError;

/// Fraction of the commanded velocity that actually moves the agent.
/// The actuation is damped; filters that drift at the full commanded rate
/// overshoot the true position systematically.
pub const CONTROL_DAMPING: f64 = 0.8;

/// Gaussian probability density of an error at the given standard deviation.
#[inline]
pub fn gaussian_pdf(error: f64, std: f64) -> f64 {
    let coeff = 1.0 / ((2.0 * std::f64::consts::PI).sqrt() * std);
    coeff * (-(error * error) / (2.0 * std * std)).exp()
}

/// Range-only measurement model for a fixed set of K >= 1 beacons with
/// i.i.d. Gaussian sensor noise.
#[derive(Clone, Debug)]
pub struct RangeSensor {
    beacons: Vec<Vector2<f64>>,
    noise_std: f64,
}

impl RangeSensor {
    /// Create a range sensor over a fixed beacon set.
    ///
    /// # Panics
    /// Panics if the beacon set is empty or the noise standard deviation is
    /// not positive.
    pub fn new(beacons: Vec<Vector2<f64>>, noise_std: f64) -> Self {
        assert!(!beacons.is_empty(), "beacon set must not be empty");
        assert!(noise_std > 0.0, "sensor noise std must be positive");
        RangeSensor { beacons, noise_std }
    }

    pub fn num_beacons(&self) -> usize {
        self.beacons.len()
    }

    pub fn noise_std(&self) -> f64 {
        self.noise_std
    }

    pub fn beacons(&self) -> &[Vector2<f64>] {
        &self.beacons
    }

    /// Verify a measurement vector against the beacon count. Called by every
    /// filter before touching its state.
    pub fn check_dimension(&self, measurement: &[f64]) -> Result<(), FilterError> {
        if measurement.len() != self.beacons.len() {
            return Err(FilterError::DimensionMismatch {
                expected: self.beacons.len(),
                got: measurement.len(),
            });
        }
        Ok(())
    }

    /// Expected range to each beacon from the given position: h(x).
    pub fn expected_ranges(&self, position: &Vector2<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.beacons.len(),
            self.beacons.iter().map(|b| (position - b).norm()),
        )
    }

    /// Jacobian of the range function at the given position (K x 2).
    ///
    /// Row i is (dx_i / d_i, dy_i / d_i). A beacon at zero distance gets a
    /// zero row rather than a division by zero; the measurement carries no
    /// directional information there.
    pub fn jacobian(&self, position: &Vector2<f64>) -> DMatrix<f64> {
        let mut h = DMatrix::<f64>::zeros(self.beacons.len(), 2);
        for (i, beacon) in self.beacons.iter().enumerate() {
            let delta = position - beacon;
            let dist = delta.norm();
            if dist > 0.0 {
                h[(i, 0)] = delta.x / dist;
                h[(i, 1)] = delta.y / dist;
            }
        }
        h
    }

    /// Measurement noise covariance R = sigma^2 * I_K.
    pub fn noise_covariance(&self) -> DMatrix<f64> {
        DMatrix::<f64>::identity(self.beacons.len(), self.beacons.len())
            * (self.noise_std * self.noise_std)
    }

    /// Joint likelihood of a measurement vector at a hypothesized position:
    /// the product of per-beacon Gaussian range likelihoods (conditional
    /// independence across beacons).
    ///
    /// The particle filter and the grid filter both call this, so the two
    /// always agree on how evidence is weighed. The caller must have checked
    /// the measurement dimension.
    pub fn likelihood(&self, position: &Vector2<f64>, measurement: &[f64]) -> f64 {
        let mut likelihood = 1.0;
        for (beacon, &z) in self.beacons.iter().zip(measurement.iter()) {
            let z_hat = (position - beacon).norm();
            likelihood *= gaussian_pdf(z_hat - z, self.noise_std);
        }
        likelihood
    }

    /// Draw a noisy range measurement vector from a true position. Used by
    /// the simulation collaborators, not by the filters.
    pub fn measure(&self, true_position: &Vector2<f64>, rng: &mut StdRng) -> Vec<f64> {
        let noise = Normal::new(0.0, self.noise_std).expect("valid sensor noise std");
        self.beacons
            .iter()
            .map(|b| (true_position - b).norm() + noise.sample(rng))
            .collect()
    }
}
