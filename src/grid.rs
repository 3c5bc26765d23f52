//! Discretized histogram filter over a fixed lattice.
//!
//! The belief is a dense matrix of cell weights, one cell per lattice square
//! of fixed resolution, with precomputed cell centers. Prediction convolves
//! the belief with a Gaussian motion kernel evaluated against the expected
//! displacement; the convolution window is bounded by the motion radius plus
//! a small margin, which is the deliberate accuracy/runtime trade that makes
//! discretization tractable. This double loop is the hot path of the whole
//! filter trio: O(cells * window^2) per predict.

use log::warn;
use nalgebra::{DMatrix, Vector2};

use crate::errors::FilterError;
use crate::model::{CONTROL_DAMPING, RangeSensor};

/// Standard deviation of the isotropic motion kernel (pixels).
const KERNEL_SIGMA: f64 = 12.0;
/// Extra cells added to the motion radius so the kernel tails are not
/// clipped at low speeds.
const WINDOW_MARGIN_CELLS: i64 = 3;

/// Histogram filter belief over a bounded rectangular domain.
#[derive(Clone, Debug)]
pub struct GridFilter {
    resolution: f64,
    rows: usize,
    cols: usize,
    /// Belief weights, indexed (row, col); row indexes y, col indexes x.
    belief: DMatrix<f64>,
    /// Precomputed x coordinate of each column's cell center.
    cell_x: Vec<f64>,
    /// Precomputed y coordinate of each row's cell center.
    cell_y: Vec<f64>,
    /// Persistent local-flow correction added to the expected displacement.
    flow: Vector2<f64>,
}

impl GridFilter {
    /// Build the lattice and initialize the belief as a Gaussian bump of
    /// standard deviation `start_std` centered at the known start position.
    ///
    /// # Panics
    /// Panics if the resolution is not positive or does not fit the domain
    /// at least once in each dimension.
    pub fn new(
        width: f64,
        height: f64,
        resolution: f64,
        start: Vector2<f64>,
        start_std: f64,
    ) -> Self {
        assert!(resolution > 0.0, "grid resolution must be positive");
        let cols = (width / resolution) as usize;
        let rows = (height / resolution) as usize;
        assert!(rows > 0 && cols > 0, "domain too small for the resolution");
        assert!(start_std > 0.0, "start std must be positive");

        let cell_x: Vec<f64> = (0..cols)
            .map(|c| c as f64 * resolution + resolution / 2.0)
            .collect();
        let cell_y: Vec<f64> = (0..rows)
            .map(|r| r as f64 * resolution + resolution / 2.0)
            .collect();

        let mut belief = DMatrix::<f64>::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                let dx = cell_x[c] - start.x;
                let dy = cell_y[r] - start.y;
                belief[(r, c)] = (-(dx * dx + dy * dy) / (2.0 * start_std * start_std)).exp();
            }
        }
        let total = belief.sum();
        if total > 0.0 {
            belief /= total;
        } else {
            // Start far outside the domain leaves no mass; fall back to a
            // uniform prior.
            belief.fill(1.0 / (rows * cols) as f64);
        }

        GridFilter {
            resolution,
            rows,
            cols,
            belief,
            cell_x,
            cell_y,
            flow: Vector2::zeros(),
        }
    }

    /// (rows, cols) of the lattice.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Read access to the belief weights for rendering collaborators.
    pub fn belief(&self) -> &DMatrix<f64> {
        &self.belief
    }

    /// Set the local-flow correction layered on top of the damped drift in
    /// the motion kernel. Zero by default.
    pub fn set_flow(&mut self, flow: Vector2<f64>) {
        self.flow = flow;
    }

    /// Predict step: bounded-radius convolution of the belief with the
    /// motion kernel.
    ///
    /// Every source cell scatters its mass into destination cells within the
    /// motion radius, weighted by a Gaussian on the difference between the
    /// cell-to-cell displacement and the expected displacement
    /// `flow + CONTROL_DAMPING * mu * dt`. Cells beyond the radius receive
    /// nothing; the margin keeps the kernel tails inside the window at low
    /// speeds. With dt = 0 the transform is the identity.
    pub fn predict(&mut self, control: Vector2<f64>, dt: f64) {
        if dt == 0.0 {
            return;
        }
        let drift = self.flow + CONTROL_DAMPING * control * dt;
        let radius = ((control.norm() * dt) / self.resolution).ceil() as i64 + WINDOW_MARGIN_CELLS;
        let two_sigma_sq = 2.0 * KERNEL_SIGMA * KERNEL_SIGMA;

        let mut next = DMatrix::<f64>::zeros(self.rows, self.cols);
        for sr in 0..self.rows {
            for sc in 0..self.cols {
                let mass = self.belief[(sr, sc)];
                if mass == 0.0 {
                    continue;
                }
                let r_lo = (sr as i64 - radius).max(0) as usize;
                let r_hi = (sr as i64 + radius).min(self.rows as i64 - 1) as usize;
                let c_lo = (sc as i64 - radius).max(0) as usize;
                let c_hi = (sc as i64 + radius).min(self.cols as i64 - 1) as usize;
                for dr in r_lo..=r_hi {
                    let dy = self.cell_y[dr] - self.cell_y[sr] - drift.y;
                    for dc in c_lo..=c_hi {
                        let dx = self.cell_x[dc] - self.cell_x[sc] - drift.x;
                        next[(dr, dc)] += mass * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
                    }
                }
            }
        }

        let total = next.sum();
        if total > 0.0 && total.is_finite() {
            next /= total;
            self.belief = next;
        } else {
            warn!("belief mass collapsed to {total} during predict; resetting to uniform");
            self.reset_uniform();
        }
    }

    /// Update step: multiply every cell by the joint range likelihood of the
    /// measurement at that cell's center, then renormalize. A total mass of
    /// zero (every cell outside the sensor's plausible band under floating
    /// point) is reported and recovered by resetting to a uniform belief.
    pub fn update(&mut self, measurement: &[f64], sensor: &RangeSensor) -> Result<(), FilterError> {
        sensor.check_dimension(measurement)?;
        for r in 0..self.rows {
            for c in 0..self.cols {
                let center = Vector2::new(self.cell_x[c], self.cell_y[r]);
                self.belief[(r, c)] *= sensor.likelihood(&center, measurement);
            }
        }
        let total = self.belief.sum();
        if total > 0.0 && total.is_finite() {
            self.belief /= total;
        } else {
            warn!("belief mass collapsed to {total} during update; resetting to uniform");
            self.reset_uniform();
        }
        Ok(())
    }

    /// Weighted centroid of the cell centers. The belief sums to 1 after
    /// every predict/update, but the total is recomputed defensively.
    pub fn estimate(&self) -> Vector2<f64> {
        let mut x = 0.0;
        let mut y = 0.0;
        let mut total = 0.0;
        for r in 0..self.rows {
            for c in 0..self.cols {
                let w = self.belief[(r, c)];
                x += w * self.cell_x[c];
                y += w * self.cell_y[r];
                total += w;
            }
        }
        Vector2::new(x / total, y / total)
    }

    fn reset_uniform(&mut self) {
        self.belief.fill(1.0 / (self.rows * self.cols) as f64);
    }
}
