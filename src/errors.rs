//! Error taxonomy for the estimator core.
//!
//! Only two conditions are surfaced as errors: a measurement vector whose
//! length does not match the beacon set, and a singular innovation covariance
//! in the EKF update. Numerical degeneracies (weight or belief mass collapse)
//! are recovered in place by the filters and reported through the `log`
//! facade instead, so a long-running cycle never has to restart a filter.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    /// The measurement vector length does not match the beacon count.
    /// Raised before any filter state is mutated.
    #[error("dimension mismatch: expected {expected} range measurements, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The innovation covariance S = H P H^T + R could not be inverted.
    /// This indicates a rank-deficient measurement geometry (for example
    /// duplicated beacon positions) and is fatal for the update.
    #[error("singular innovation covariance; measurement geometry is rank-deficient")]
    SingularInnovation,
}
