//! Extended Kalman Filter for range-only localization.
//!
//! The state is the 2D position; the motion model is a damped velocity drift
//! with identity state transition, so the predict step is linear and only
//! the range measurement needs linearization. The measurement Jacobian is
//! the stack of unit vectors from each beacon to the state estimate.
//!
//! The covariance update deliberately uses the first-order form
//! `P -= K H P` rather than the Joseph form. Under ill conditioning this can
//! lose positive semi-definiteness; a symmetrization pass after each update
//! keeps round-off asymmetry out, but the first-order form itself is part of
//! the filter's contract and is not silently "fixed" here.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::errors::FilterError;
use crate::model::{CONTROL_DAMPING, RangeSensor};

/// Process noise policy for the EKF predict step.
///
/// Two formulations are supported. `ControlScaled` derives the per-axis
/// variance from the variance of the Beta-distributed actuation fidelity
/// scaled by the commanded displacement, which matches how the simulated
/// agent actually moves and is the default. `Fixed` is the textbook constant
/// diagonal and is useful when the control magnitude is unbounded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProcessNoiseModel {
    /// Q = std^2 * I, independent of the control input.
    Fixed { std: f64 },
    /// Q_ii = scale * Var[Beta(shape_a, shape_b)] * (mu_i * dt)^2.
    ControlScaled {
        shape_a: f64,
        shape_b: f64,
        scale: f64,
    },
}

impl Default for ProcessNoiseModel {
    fn default() -> Self {
        ProcessNoiseModel::ControlScaled {
            shape_a: 7.0,
            shape_b: 2.0,
            scale: 5.0,
        }
    }
}

impl ProcessNoiseModel {
    /// Process noise covariance for one predict step.
    pub fn covariance(&self, control: &Vector2<f64>, dt: f64) -> Matrix2<f64> {
        match *self {
            ProcessNoiseModel::Fixed { std } => Matrix2::identity() * (std * std),
            ProcessNoiseModel::ControlScaled {
                shape_a: a,
                shape_b: b,
                scale,
            } => {
                let var_alpha = (a * b) / ((a + b).powi(2) * (a + b + 1.0));
                let q_x = scale * var_alpha * (control.x * dt).powi(2);
                let q_y = scale * var_alpha * (control.y * dt).powi(2);
                Matrix2::new(q_x, 0.0, 0.0, q_y)
            }
        }
    }
}

/// Two-state EKF with a construction-bound beacon set and sensor noise.
#[derive(Clone, Debug)]
pub struct ExtendedKalmanFilter {
    state: Vector2<f64>,
    covariance: Matrix2<f64>,
    sensor: RangeSensor,
    process_noise: ProcessNoiseModel,
}

impl ExtendedKalmanFilter {
    pub fn new(
        initial_state: Vector2<f64>,
        initial_covariance: Matrix2<f64>,
        sensor: RangeSensor,
        process_noise: ProcessNoiseModel,
    ) -> Self {
        ExtendedKalmanFilter {
            state: initial_state,
            covariance: initial_covariance,
            sensor,
            process_noise,
        }
    }

    /// Predict step: damped velocity drift and covariance inflation.
    ///
    /// `state += CONTROL_DAMPING * mu * dt`; with F = I the covariance
    /// propagation reduces to `P = Q + P`.
    pub fn predict(&mut self, control: Vector2<f64>, dt: f64) {
        self.state += CONTROL_DAMPING * control * dt;
        self.covariance += self.process_noise.covariance(&control, dt);
    }

    /// Update step with one range per beacon.
    ///
    /// Returns `DimensionMismatch` (before any state mutation) if the
    /// measurement length differs from the beacon count, and
    /// `SingularInnovation` if S cannot be inverted.
    pub fn update(&mut self, measurement: &[f64]) -> Result<(), FilterError> {
        self.sensor.check_dimension(measurement)?;

        let h = self.sensor.jacobian(&self.state);
        let z_hat = self.sensor.expected_ranges(&self.state);
        let z = DVector::from_column_slice(measurement);

        // Work in dynamic matrices for the K-dimensional measurement space.
        let p = DMatrix::<f64>::from_iterator(2, 2, self.covariance.iter().cloned());
        let s = &h * &p * h.transpose() + self.sensor.noise_covariance();
        let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;
        let gain = &p * h.transpose() * s_inv;

        let correction = &gain * (z - z_hat);
        self.state += Vector2::new(correction[0], correction[1]);

        // First-order covariance update, then symmetrize round-off away.
        let p_new = &p - &gain * &h * &p;
        let p2 = Matrix2::new(p_new[(0, 0)], p_new[(0, 1)], p_new[(1, 0)], p_new[(1, 1)]);
        self.covariance = 0.5 * (p2 + p2.transpose());
        Ok(())
    }

    /// Current point estimate of the position.
    pub fn estimate(&self) -> Vector2<f64> {
        self.state
    }

    /// Current 2x2 state covariance.
    pub fn covariance(&self) -> Matrix2<f64> {
        self.covariance
    }

    pub fn sensor(&self) -> &RangeSensor {
        &self.sensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn single_beacon_ekf() -> ExtendedKalmanFilter {
        let sensor = RangeSensor::new(vec![Vector2::new(600.0, 400.0)], 20.0);
        ExtendedKalmanFilter::new(
            Vector2::new(700.0, 250.0),
            Matrix2::identity() * 100.0,
            sensor,
            ProcessNoiseModel::default(),
        )
    }

    fn triangle_ekf(initial: Vector2<f64>) -> ExtendedKalmanFilter {
        let sensor = RangeSensor::new(
            vec![
                Vector2::new(100.0, 100.0),
                Vector2::new(1100.0, 150.0),
                Vector2::new(600.0, 700.0),
            ],
            10.0,
        );
        ExtendedKalmanFilter::new(initial, Matrix2::identity() * 100.0, sensor, ProcessNoiseModel::default())
    }

    #[test]
    fn test_predict_damped_drift() {
        let mut ekf = single_beacon_ekf();
        ekf.predict(Vector2::new(100.0, -50.0), 0.1);
        assert_approx_eq!(ekf.estimate().x, 700.0 + 0.8 * 100.0 * 0.1, 1e-12);
        assert_approx_eq!(ekf.estimate().y, 250.0 - 0.8 * 50.0 * 0.1, 1e-12);
    }

    #[test]
    fn test_predict_zero_control_leaves_mean() {
        let mut ekf = single_beacon_ekf();
        ekf.predict(Vector2::zeros(), 0.0);
        assert_approx_eq!(ekf.estimate().x, 700.0, 1e-12);
        assert_approx_eq!(ekf.estimate().y, 250.0, 1e-12);
        // Control-scaled Q with mu = 0 adds nothing either
        assert_approx_eq!(ekf.covariance()[(0, 0)], 100.0, 1e-12);
    }

    #[test]
    fn test_update_dimension_mismatch_before_mutation() {
        let mut ekf = single_beacon_ekf();
        let before = ekf.estimate();
        let result = ekf.update(&[500.0, 300.0]);
        assert_eq!(
            result,
            Err(FilterError::DimensionMismatch {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(ekf.estimate(), before);
    }

    #[test]
    fn test_update_moves_toward_measurement() {
        let mut ekf = single_beacon_ekf();
        // True distance to the beacon is ~180; report a much smaller range
        ekf.update(&[50.0]).unwrap();
        let dist = (ekf.estimate() - Vector2::new(600.0, 400.0)).norm();
        assert!(dist < 180.0);
    }

    #[test]
    fn test_covariance_symmetric_and_trace_non_increasing() {
        let mut ekf = triangle_ekf(Vector2::new(500.0, 350.0));
        let z: Vec<f64> = ekf
            .sensor()
            .expected_ranges(&Vector2::new(520.0, 340.0))
            .iter()
            .cloned()
            .collect();
        let trace_before = ekf.covariance().trace();
        ekf.update(&z).unwrap();
        let p = ekf.covariance();
        assert_approx_eq!(p[(0, 1)], p[(1, 0)], 1e-9);
        assert!(p.trace() <= trace_before + 1e-9);
    }

    #[test]
    fn test_update_on_top_of_beacon_stays_finite() {
        // State exactly on the beacon produces a zero Jacobian row; S = R is
        // still invertible and the update must leave the state finite.
        let sensor = RangeSensor::new(vec![Vector2::new(300.0, 300.0)], 10.0);
        let mut ekf = ExtendedKalmanFilter::new(
            Vector2::new(300.0, 300.0),
            Matrix2::identity() * 100.0,
            sensor,
            ProcessNoiseModel::default(),
        );
        ekf.update(&[25.0]).unwrap();
        assert!(ekf.estimate().x.is_finite());
        assert!(ekf.estimate().y.is_finite());
    }

    #[test]
    fn test_fixed_process_noise_model() {
        let q = ProcessNoiseModel::Fixed { std: 3.0 }.covariance(&Vector2::new(50.0, 50.0), 0.1);
        assert_approx_eq!(q[(0, 0)], 9.0, 1e-12);
        assert_approx_eq!(q[(1, 1)], 9.0, 1e-12);
        assert_approx_eq!(q[(0, 1)], 0.0, 1e-12);
    }

    #[test]
    fn test_control_scaled_process_noise_model() {
        let q = ProcessNoiseModel::default().covariance(&Vector2::new(100.0, 0.0), 0.5);
        // Var[Beta(7,2)] = 14 / (81 * 10)
        let var_alpha = 14.0 / 810.0;
        assert_approx_eq!(q[(0, 0)], 5.0 * var_alpha * 2500.0, 1e-9);
        assert_approx_eq!(q[(1, 1)], 0.0, 1e-12);
    }

    #[test]
    fn test_convergence_single_beacon() {
        // Static truth on top of the beacon: repeated near-zero ranges should
        // pull the mean within 2 sigma of the beacon.
        let mut ekf = single_beacon_ekf();
        for _ in 0..30 {
            ekf.predict(Vector2::zeros(), 0.05);
            ekf.update(&[1.0]).unwrap();
        }
        let err = (ekf.estimate() - Vector2::new(600.0, 400.0)).norm();
        assert!(err < 40.0, "EKF error {err} exceeds 2 sigma");
    }
}
