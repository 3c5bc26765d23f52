//! Simulation collaborators: world layout, the simulated agent, headless
//! seeded runs, and CSV export of step records.
//!
//! Nothing in this module is used by the estimators themselves; it drives
//! them the way a rendering loop or benchmark harness would. A run owns a
//! single seeded `StdRng` for the agent and the sensor, and the particle
//! filter is seeded from the same run seed, so a (seed, config) pair pins
//! the whole trajectory.

use log::info;
use nalgebra::{Matrix2, Vector2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Beta, Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::driver::FilterBank;
use crate::ekf::{ExtendedKalmanFilter, ProcessNoiseModel};
use crate::errors::FilterError;
use crate::grid::GridFilter;
use crate::model::RangeSensor;
use crate::particle::ParticleFilter;

/// Axis-aligned rectangle, used for obstacles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Bounded rectangular domain with fixed beacons and obstacles.
#[derive(Clone, Debug)]
pub struct World {
    pub width: f64,
    pub height: f64,
    pub beacons: Vec<Vector2<f64>>,
    pub obstacles: Vec<Rect>,
}

impl World {
    /// Standard world: the fixed obstacle course and a beacon layout for
    /// K >= 1. The first beacon sits at the domain center; further beacons
    /// are placed at non-collinear fractions of the domain.
    pub fn new(width: f64, height: f64, num_beacons: usize) -> Self {
        assert!(num_beacons >= 1, "need at least one beacon");
        let anchor_fractions = [
            (0.5, 0.5),
            (0.25, 0.25),
            (0.75, 0.25),
            (0.25, 0.75),
            (0.75, 0.75),
            (0.5, 0.125),
        ];
        let beacons = (0..num_beacons)
            .map(|i| {
                let (fx, fy) = anchor_fractions[i % anchor_fractions.len()];
                // Wrapping past the anchor list perturbs repeats off each
                // other so no two beacons coincide.
                let lap = (i / anchor_fractions.len()) as f64;
                Vector2::new(width * fx + 13.0 * lap, height * fy + 7.0 * lap)
            })
            .collect();
        let obstacles = vec![
            Rect::new(200.0, 150.0, 100.0, 300.0),
            Rect::new(500.0, 100.0, 50.0, 400.0),
            Rect::new(300.0, 400.0, 200.0, 30.0),
            Rect::new(200.0, 600.0, 180.0, 80.0),
            Rect::new(900.0, 300.0, 100.0, 200.0),
            Rect::new(700.0, 600.0, 150.0, 80.0),
            Rect::new(400.0, 200.0, 50.0, 50.0),
            Rect::new(1000.0, 100.0, 160.0, 300.0),
            Rect::new(570.0, 370.0, 80.0, 80.0),
        ];
        World {
            width,
            height,
            beacons,
            obstacles,
        }
    }

    pub fn collides(&self, point: &Vector2<f64>) -> bool {
        self.obstacles.iter().any(|obs| obs.contains(point))
    }

    pub fn in_bounds(&self, point: &Vector2<f64>) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }
}

/// Simulated agent with imperfect actuation.
///
/// The true motion applies a Beta-distributed fraction of the commanded
/// velocity, an Ornstein-Uhlenbeck dead-reckoning drift, and per-axis
/// Gaussian bumpiness. Movement is attempted per axis; hitting a bound or an
/// obstacle reverses that axis of the control with a stochastic factor, so
/// the commanded velocity the filters see stays consistent with what the
/// agent actually does.
#[derive(Clone, Debug)]
pub struct Agent {
    pub position: Vector2<f64>,
    ou_state: Vector2<f64>,
    actuation: Beta<f64>,
    bumpiness: Normal<f64>,
    ou_noise: Normal<f64>,
    bounce: Normal<f64>,
}

/// OU mean-reversion rate for the dead-reckoning drift.
const OU_THETA: f64 = 1.0e-5;
/// OU diffusion for the dead-reckoning drift.
const OU_SIGMA: f64 = 500.0;

impl Agent {
    pub fn new(start: Vector2<f64>) -> Self {
        Agent {
            position: start,
            ou_state: Vector2::new(-4.0, -4.0),
            actuation: Beta::new(3.0, 2.0).expect("valid Beta shape parameters"),
            bumpiness: Normal::new(0.0, 10.0).expect("valid bumpiness std"),
            ou_noise: Normal::new(0.0, 1.0).expect("valid OU noise std"),
            bounce: Normal::new(1.0, 0.05).expect("valid bounce std"),
        }
    }

    /// Advance the true state one step. Returns the (possibly reversed)
    /// control input actually in effect after collision handling; the caller
    /// feeds that same vector to the filters.
    pub fn step(
        &mut self,
        mut control: Vector2<f64>,
        dt: f64,
        world: &World,
        rng: &mut StdRng,
    ) -> Vector2<f64> {
        let fidelity = self.actuation.sample(rng);
        let sqrt_dt = dt.sqrt();
        self.ou_state.x = -OU_THETA * self.ou_state.x * dt + OU_SIGMA * sqrt_dt * self.ou_noise.sample(rng);
        self.ou_state.y = -OU_THETA * self.ou_state.y * dt + OU_SIGMA * sqrt_dt * self.ou_noise.sample(rng);
        let bump_x = self.bumpiness.sample(rng);
        let bump_y = self.bumpiness.sample(rng);

        // X axis
        let dx = (control.x * fidelity + self.ou_state.x.min(0.0) + bump_x) * dt;
        let tried_x = Vector2::new(self.position.x + dx, self.position.y);
        if world.in_bounds(&tried_x) && !world.collides(&tried_x) {
            self.position.x = tried_x.x;
        } else {
            control.x *= -self.bounce.sample(rng);
            self.position.x += (control.x * fidelity + self.ou_state.x.min(0.0) + bump_x) * dt;
            self.position.x = self.position.x.clamp(0.0, world.width);
        }

        // Y axis
        let dy = (control.y * fidelity + self.ou_state.y.min(0.0) + bump_y) * dt;
        let tried_y = Vector2::new(self.position.x, self.position.y + dy);
        if world.in_bounds(&tried_y) && !world.collides(&tried_y) {
            self.position.y = tried_y.y;
        } else {
            control.y *= -self.bounce.sample(rng);
            self.position.y += (control.y * fidelity + self.ou_state.y.min(0.0) + bump_y) * dt;
            self.position.y = self.position.y.clamp(0.0, world.height);
        }

        control
    }
}

/// Parameters of a headless run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub width: f64,
    pub height: f64,
    pub num_beacons: usize,
    pub num_particles: usize,
    pub sensor_noise: f64,
    pub grid_resolution: f64,
    pub start: (f64, f64),
    pub dt: f64,
    pub steps: usize,
    /// Mean of the random initial commanded velocity, per axis.
    pub initial_speed_mean: f64,
    /// Std of the random initial commanded velocity, per axis.
    pub initial_speed_std: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            width: 1200.0,
            height: 800.0,
            num_beacons: 1,
            num_particles: 200,
            sensor_noise: 20.0,
            grid_resolution: 20.0,
            start: (700.0, 250.0),
            dt: 0.05,
            steps: 300,
            initial_speed_mean: 2000.0,
            initial_speed_std: 200.0,
        }
    }
}

/// One row of the per-step output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub ekf_x: f64,
    pub ekf_y: f64,
    pub ekf_std_x: f64,
    pub ekf_std_y: f64,
    pub pf_x: f64,
    pub pf_y: f64,
    pub grid_x: f64,
    pub grid_y: f64,
    pub error_ekf: f64,
    pub error_pf: f64,
    pub error_grid: f64,
}

impl StepRecord {
    /// Write step records to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Outcome of one seeded run.
#[derive(Clone, Debug, Serialize)]
pub struct RunResult {
    pub seed: u64,
    pub rmse_ekf: f64,
    pub rmse_pf: f64,
    pub rmse_grid: f64,
    #[serde(skip)]
    pub records: Vec<StepRecord>,
}

/// Run one headless seeded simulation: the agent wanders the obstacle
/// course while the filter bank tracks it from noisy ranges.
pub fn run_simulation(config: &SimulationConfig, seed: u64) -> Result<RunResult, FilterError> {
    let world = World::new(config.width, config.height, config.num_beacons);
    let sensor = RangeSensor::new(world.beacons.clone(), config.sensor_noise);
    let start = Vector2::new(config.start.0, config.start.1);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut agent = Agent::new(start);

    let ekf = ExtendedKalmanFilter::new(
        start,
        Matrix2::identity() * 100.0,
        sensor.clone(),
        ProcessNoiseModel::default(),
    );
    let pf = ParticleFilter::new_with_seed(
        config.num_particles,
        config.width,
        config.height,
        // Decorrelate the filter's stream from the world's without losing
        // determinism in either.
        seed.wrapping_add(0x9e37_79b9_7f4a_7c15),
    );
    let grid = GridFilter::new(
        config.width,
        config.height,
        config.grid_resolution,
        start,
        2.0 * config.grid_resolution,
    );
    let mut bank = FilterBank::new(ekf, pf, grid, sensor.clone());

    let speed = Normal::new(config.initial_speed_mean, config.initial_speed_std)
        .expect("valid initial speed distribution");
    let mut control = Vector2::new(speed.sample(&mut rng), speed.sample(&mut rng));

    let mut records = Vec::with_capacity(config.steps);
    let mut sq_err = (0.0, 0.0, 0.0);
    for step in 0..config.steps {
        control = agent.step(control, config.dt, &world, &mut rng);
        let z = sensor.measure(&agent.position, &mut rng);
        let estimates = bank.step(control, &z, config.dt)?;

        let error_ekf = (estimates.ekf - agent.position).norm();
        let error_pf = (estimates.pf - agent.position).norm();
        let error_grid = (estimates.grid - agent.position).norm();
        sq_err.0 += error_ekf * error_ekf;
        sq_err.1 += error_pf * error_pf;
        sq_err.2 += error_grid * error_grid;

        records.push(StepRecord {
            step,
            time: step as f64 * config.dt,
            true_x: agent.position.x,
            true_y: agent.position.y,
            ekf_x: estimates.ekf.x,
            ekf_y: estimates.ekf.y,
            ekf_std_x: estimates.ekf_covariance[(0, 0)].max(0.0).sqrt(),
            ekf_std_y: estimates.ekf_covariance[(1, 1)].max(0.0).sqrt(),
            pf_x: estimates.pf.x,
            pf_y: estimates.pf.y,
            grid_x: estimates.grid.x,
            grid_y: estimates.grid.y,
            error_ekf,
            error_pf,
            error_grid,
        });
    }

    let n = config.steps.max(1) as f64;
    let result = RunResult {
        seed,
        rmse_ekf: (sq_err.0 / n).sqrt(),
        rmse_pf: (sq_err.1 / n).sqrt(),
        rmse_grid: (sq_err.2 / n).sqrt(),
        records,
    };
    info!(
        "run seed={} rmse ekf={:.2} pf={:.2} grid={:.2}",
        seed, result.rmse_ekf, result.rmse_pf, result.rmse_grid
    );
    Ok(result)
}

/// Mean/std/min/max of a sample, for benchmark summaries.
pub fn summary_stats(data: &[f64]) -> (f64, f64, f64, f64) {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (mean, var.sqrt(), min, max)
}
