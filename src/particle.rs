//! Bootstrap particle filter (SIS with systematic resampling).
//!
//! The proposal density is the prior: each particle drifts with a
//! Beta-distributed fraction of the commanded velocity plus an isotropic
//! radial random walk, and the importance weights are updated with the
//! shared multi-beacon range likelihood. Resampling is systematic
//! (Arulampalam et al. 2002), which minimizes resampling variance compared
//! to naive multinomial draws.
//!
//! The filter owns a seeded `StdRng`; supplying the same seed and the same
//! sequence of `(mu, z_k)` inputs reproduces a run bit for bit.

use log::warn;
use nalgebra::Vector2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Beta, Distribution, Normal};

use crate::errors::FilterError;
use crate::model::RangeSensor;

/// One position hypothesis with an importance weight.
#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub position: Vector2<f64>,
    pub weight: f64,
}

/// How the point estimate is aggregated from the particle set.
///
/// `WeightedMean` is the correct posterior-mean estimator after an update;
/// `UnweightedMean` ignores the weights the update just computed and lags
/// behind whenever the weight distribution is skewed. It is kept selectable
/// for comparison runs, not as a recommended choice.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ParticleAveragingStrategy {
    #[default]
    WeightedMean,
    UnweightedMean,
}

/// Bootstrap particle filter over a bounded rectangular domain.
#[derive(Clone, Debug)]
pub struct ParticleFilter {
    particles: Vec<Particle>,
    averaging: ParticleAveragingStrategy,
    motion_scale: Beta<f64>,
    radial_noise: Normal<f64>,
    rng: StdRng,
}

/// Shape parameters of the per-particle actuation fidelity draw.
const MOTION_SCALE_SHAPE: (f64, f64) = (6.0, 3.0);
/// Standard deviation of the isotropic radial random-walk term (pixels).
const RADIAL_NOISE_STD: f64 = 8.0;

impl ParticleFilter {
    /// Create a filter with `num_particles` particles drawn uniformly over
    /// the `width` x `height` domain, all weighted 1/N.
    ///
    /// # Panics
    /// Panics if `num_particles` is zero or the domain is empty.
    pub fn new_with_seed(num_particles: usize, width: f64, height: f64, seed: u64) -> Self {
        assert!(num_particles > 0, "number of particles must be positive");
        assert!(width > 0.0 && height > 0.0, "domain must be non-empty");
        let mut rng = StdRng::seed_from_u64(seed);
        let uniform_weight = 1.0 / num_particles as f64;
        let particles = (0..num_particles)
            .map(|_| Particle {
                position: Vector2::new(
                    rng.random_range(0.0..width),
                    rng.random_range(0.0..height),
                ),
                weight: uniform_weight,
            })
            .collect();
        ParticleFilter {
            particles,
            averaging: ParticleAveragingStrategy::default(),
            motion_scale: Beta::new(MOTION_SCALE_SHAPE.0, MOTION_SCALE_SHAPE.1)
                .expect("valid Beta shape parameters"),
            radial_noise: Normal::new(0.0, RADIAL_NOISE_STD).expect("valid radial noise std"),
            rng,
        }
    }

    pub fn set_averaging_strategy(&mut self, strategy: ParticleAveragingStrategy) {
        self.averaging = strategy;
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Predict step: propagate every particle through the proposal density.
    ///
    /// Each particle draws its own actuation fidelity from Beta(6, 3) and an
    /// isotropic perturbation r * (cos theta, sin theta) with
    /// r ~ N(0, 8) and theta ~ U[0, 2 pi).
    pub fn predict(&mut self, control: Vector2<f64>, dt: f64) {
        for particle in &mut self.particles {
            let scale = self.motion_scale.sample(&mut self.rng);
            let angle = self.rng.random_range(0.0..std::f64::consts::TAU);
            let r = self.radial_noise.sample(&mut self.rng);
            particle.position.x += control.x * scale * dt + r * angle.cos();
            particle.position.y += control.y * scale * dt + r * angle.sin();
        }
    }

    /// Update step: multiply each weight by the joint range likelihood and
    /// renormalize.
    ///
    /// If every particle is assigned zero likelihood (all hypotheses far
    /// outside the sensor's plausible band), normalization is undefined; the
    /// degeneracy is reported and the weights are reset to uniform 1/N, the
    /// same recovery the grid filter applies to its belief.
    pub fn update(&mut self, measurement: &[f64], sensor: &RangeSensor) -> Result<(), FilterError> {
        sensor.check_dimension(measurement)?;
        let mut sum_weights = 0.0;
        for particle in &mut self.particles {
            particle.weight *= sensor.likelihood(&particle.position, measurement);
            sum_weights += particle.weight;
        }
        if sum_weights > 0.0 && sum_weights.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum_weights;
            }
        } else {
            warn!(
                "particle weight sum collapsed to {sum_weights}; resetting {} weights to uniform",
                self.particles.len()
            );
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
        }
        Ok(())
    }

    /// Approximate effective sample size, 1 / sum(w_i^2). Lies in [1, N];
    /// equals N for uniform weights and 1 when a single particle carries all
    /// the mass.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        1.0 / sum_sq
    }

    /// Systematic resampling: one uniform offset u1 in [0, 1/N), N equally
    /// spaced targets u1 + j/N walked against the weight CDF. Every output
    /// particle's weight is reset to 1/N; cardinality is preserved.
    pub fn resample(&mut self) {
        let n = self.particles.len();
        let mut cdf = Vec::with_capacity(n);
        let mut acc = 0.0;
        for particle in &self.particles {
            acc += particle.weight;
            cdf.push(acc);
        }
        // Guard the tail against accumulated round-off so the CDF walk
        // cannot run off the end.
        cdf[n - 1] = f64::MAX;

        let u1 = self.rng.random_range(0.0..1.0 / n as f64);
        let uniform_weight = 1.0 / n as f64;
        let mut new_particles = Vec::with_capacity(n);
        let mut i = 0;
        for j in 0..n {
            let u = u1 + j as f64 / n as f64;
            while u > cdf[i] {
                i += 1;
            }
            let mut selected = self.particles[i];
            selected.weight = uniform_weight;
            new_particles.push(selected);
        }
        self.particles = new_particles;
    }

    /// Point estimate of the position under the configured averaging
    /// strategy.
    pub fn estimate(&self) -> Vector2<f64> {
        match self.averaging {
            ParticleAveragingStrategy::WeightedMean => {
                let mut mean = Vector2::zeros();
                for particle in &self.particles {
                    mean += particle.weight * particle.position;
                }
                mean
            }
            ParticleAveragingStrategy::UnweightedMean => {
                let n = self.particles.len() as f64;
                let mut mean = Vector2::zeros();
                for particle in &self.particles {
                    mean += particle.position / n;
                }
                mean
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn sensor() -> RangeSensor {
        RangeSensor::new(vec![Vector2::new(600.0, 400.0)], 20.0)
    }

    #[test]
    fn test_initialization_uniform_weights_in_bounds() {
        let pf = ParticleFilter::new_with_seed(150, 1200.0, 800.0, 42);
        assert_eq!(pf.num_particles(), 150);
        for p in pf.particles() {
            assert!(p.position.x >= 0.0 && p.position.x < 1200.0);
            assert!(p.position.y >= 0.0 && p.position.y < 800.0);
            assert_approx_eq!(p.weight, 1.0 / 150.0, 1e-12);
        }
    }

    #[test]
    fn test_weights_sum_to_one_after_update() {
        let mut pf = ParticleFilter::new_with_seed(200, 1200.0, 800.0, 42);
        pf.update(&[150.0], &sensor()).unwrap();
        let total: f64 = pf.particles().iter().map(|p| p.weight).sum();
        assert_approx_eq!(total, 1.0, 1e-9);
    }

    #[test]
    fn test_update_dimension_mismatch() {
        let mut pf = ParticleFilter::new_with_seed(10, 100.0, 100.0, 1);
        assert_eq!(
            pf.update(&[10.0, 20.0], &sensor()),
            Err(FilterError::DimensionMismatch {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn test_effective_sample_size_bounds() {
        let mut pf = ParticleFilter::new_with_seed(100, 1200.0, 800.0, 42);
        // Uniform weights: ESS == N
        assert_approx_eq!(pf.effective_sample_size(), 100.0, 1e-9);
        // One particle carries everything: ESS == 1
        for p in &mut pf.particles {
            p.weight = 0.0;
        }
        pf.particles[0].weight = 1.0;
        assert_approx_eq!(pf.effective_sample_size(), 1.0, 1e-12);
    }

    #[test]
    fn test_resample_preserves_cardinality_and_resets_weights() {
        let mut pf = ParticleFilter::new_with_seed(200, 1200.0, 800.0, 42);
        pf.update(&[150.0], &sensor()).unwrap();
        pf.resample();
        assert_eq!(pf.num_particles(), 200);
        for p in pf.particles() {
            assert_approx_eq!(p.weight, 1.0 / 200.0, 1e-12);
        }
    }

    #[test]
    fn test_resample_favors_heavy_particles() {
        let mut pf = ParticleFilter::new_with_seed(100, 1000.0, 1000.0, 7);
        // Concentrate all mass on one particle; resampling must duplicate it
        for p in &mut pf.particles {
            p.weight = 0.0;
        }
        pf.particles[17].weight = 1.0;
        let heavy = pf.particles[17].position;
        pf.resample();
        for p in pf.particles() {
            assert_eq!(p.position, heavy);
        }
    }

    #[test]
    fn test_degenerate_update_resets_uniform() {
        let mut pf = ParticleFilter::new_with_seed(50, 100.0, 100.0, 3);
        // A range wildly outside plausibility zeroes every likelihood
        pf.update(&[1.0e6], &sensor()).unwrap();
        for p in pf.particles() {
            assert_approx_eq!(p.weight, 1.0 / 50.0, 1e-12);
        }
    }

    #[test]
    fn test_predict_zero_control_unbiased() {
        // With mu = 0 the drift term vanishes; the radial noise is zero-mean,
        // so the set centroid moves only within statistical tolerance.
        let mut pf = ParticleFilter::new_with_seed(2000, 1200.0, 800.0, 42);
        let before = pf.estimate();
        pf.predict(Vector2::zeros(), 0.0);
        let after = pf.estimate();
        assert!((after - before).norm() < 2.0);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let sensor = sensor();
        let mut a = ParticleFilter::new_with_seed(100, 1200.0, 800.0, 99);
        let mut b = ParticleFilter::new_with_seed(100, 1200.0, 800.0, 99);
        for _ in 0..5 {
            a.predict(Vector2::new(40.0, -20.0), 0.05);
            b.predict(Vector2::new(40.0, -20.0), 0.05);
            a.update(&[180.0], &sensor).unwrap();
            b.update(&[180.0], &sensor).unwrap();
        }
        assert_eq!(a.estimate(), b.estimate());
    }

    #[test]
    fn test_weighted_mean_tracks_likely_region() {
        let sensor = RangeSensor::new(vec![Vector2::new(500.0, 500.0)], 20.0);
        let mut pf = ParticleFilter::new_with_seed(3000, 1000.0, 1000.0, 11);
        // Truth near the beacon: repeated small ranges should pull the
        // weighted mean into the beacon's neighborhood.
        for _ in 0..6 {
            pf.predict(Vector2::zeros(), 0.05);
            pf.update(&[10.0], &sensor).unwrap();
            if pf.effective_sample_size() < 1000.0 {
                pf.resample();
            }
        }
        let err = (pf.estimate() - Vector2::new(500.0, 500.0)).norm();
        assert!(err < 60.0, "weighted mean {err} too far from beacon");
    }
}
