//! Estimation cycle driver.
//!
//! [`FilterBank`] runs one predict/update cycle per discrete timestep for
//! all three filters against the same control input and measurement vector,
//! so their estimates stay comparable step for step. The filters never
//! reference each other; the bank only sequences their calls and applies the
//! particle filter's resampling trigger.

use nalgebra::{Matrix2, Vector2};

use crate::ekf::ExtendedKalmanFilter;
use crate::errors::FilterError;
use crate::grid::GridFilter;
use crate::model::RangeSensor;
use crate::particle::ParticleFilter;

/// Resample when the effective sample size drops below this fraction of N.
const RESAMPLE_FRACTION: f64 = 1.0 / 3.0;

/// Estimates produced by one cycle.
#[derive(Clone, Copy, Debug)]
pub struct CycleEstimates {
    pub ekf: Vector2<f64>,
    pub ekf_covariance: Matrix2<f64>,
    pub pf: Vector2<f64>,
    pub grid: Vector2<f64>,
    /// Whether the particle filter resampled this cycle.
    pub resampled: bool,
}

/// The three estimators plus the shared sensor model, stepped in lockstep.
pub struct FilterBank {
    pub ekf: ExtendedKalmanFilter,
    pub pf: ParticleFilter,
    pub grid: GridFilter,
    sensor: RangeSensor,
}

impl FilterBank {
    pub fn new(
        ekf: ExtendedKalmanFilter,
        pf: ParticleFilter,
        grid: GridFilter,
        sensor: RangeSensor,
    ) -> Self {
        FilterBank {
            ekf,
            pf,
            grid,
            sensor,
        }
    }

    pub fn sensor(&self) -> &RangeSensor {
        &self.sensor
    }

    /// One full predict -> update -> (resample) cycle.
    ///
    /// The dimension of `measurement` is validated against the beacon set
    /// before any filter is touched, so a mismatched vector cannot leave the
    /// bank partially updated.
    pub fn step(
        &mut self,
        control: Vector2<f64>,
        measurement: &[f64],
        dt: f64,
    ) -> Result<CycleEstimates, FilterError> {
        self.sensor.check_dimension(measurement)?;

        self.ekf.predict(control, dt);
        self.ekf.update(measurement)?;

        self.pf.predict(control, dt);
        self.pf.update(measurement, &self.sensor)?;
        let threshold = RESAMPLE_FRACTION * self.pf.num_particles() as f64;
        let resampled = self.pf.effective_sample_size() < threshold;
        if resampled {
            self.pf.resample();
        }

        self.grid.predict(control, dt);
        self.grid.update(measurement, &self.sensor)?;

        Ok(CycleEstimates {
            ekf: self.ekf.estimate(),
            ekf_covariance: self.ekf.covariance(),
            pf: self.pf.estimate(),
            grid: self.grid.estimate(),
            resampled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ekf::ProcessNoiseModel;

    fn bank(seed: u64) -> FilterBank {
        let sensor = RangeSensor::new(vec![Vector2::new(600.0, 400.0)], 20.0);
        let ekf = ExtendedKalmanFilter::new(
            Vector2::new(700.0, 250.0),
            Matrix2::identity() * 100.0,
            sensor.clone(),
            ProcessNoiseModel::default(),
        );
        let pf = ParticleFilter::new_with_seed(200, 1200.0, 800.0, seed);
        let grid = GridFilter::new(1200.0, 800.0, 20.0, Vector2::new(700.0, 250.0), 40.0);
        FilterBank::new(ekf, pf, grid, sensor)
    }

    #[test]
    fn test_step_produces_finite_estimates() {
        let mut bank = bank(42);
        let estimates = bank
            .step(Vector2::new(50.0, 0.0), &[180.0], 0.05)
            .unwrap();
        assert!(estimates.ekf.x.is_finite());
        assert!(estimates.pf.x.is_finite());
        assert!(estimates.grid.x.is_finite());
    }

    #[test]
    fn test_step_rejects_mismatched_measurement() {
        let mut bank = bank(42);
        let ekf_before = bank.ekf.estimate();
        let result = bank.step(Vector2::zeros(), &[100.0, 200.0], 0.05);
        assert!(matches!(
            result,
            Err(FilterError::DimensionMismatch { expected: 1, got: 2 })
        ));
        assert_eq!(bank.ekf.estimate(), ekf_before);
    }

    #[test]
    fn test_lockstep_reproducibility() {
        let mut a = bank(7);
        let mut b = bank(7);
        for k in 0..10 {
            let mu = Vector2::new(30.0 + k as f64, -10.0);
            let ea = a.step(mu, &[150.0], 0.05).unwrap();
            let eb = b.step(mu, &[150.0], 0.05).unwrap();
            assert_eq!(ea.ekf, eb.ekf);
            assert_eq!(ea.pf, eb.pf);
            assert_eq!(ea.grid, eb.grid);
        }
    }
}
