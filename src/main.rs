//! RANGENAV: headless simulation and benchmarking for range-only beacon
//! localization filters.
//!
//! Two modes:
//! - `run`: one seeded simulation, optionally writing the per-step
//!   trajectory (truth, three estimates, EKF 1-sigma bounds, errors) to CSV.
//! - `benchmark`: many seeded runs in parallel, reporting RMSE summary
//!   statistics per filter.

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rayon::prelude::*;
use std::error::Error;
use std::path::PathBuf;

use rangenav::sim::{RunResult, SimulationConfig, StepRecord, run_simulation, summary_stats};

/// Command line arguments
#[derive(Parser)]
#[command(
    version,
    about = "Simulation and benchmarking for range-only beacon localization filters."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single seeded simulation
    Run {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Random seed for the run
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Write per-step records to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run repeated seeded simulations and summarize RMSE per filter
    Benchmark {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Number of runs
        #[arg(long, default_value_t = 100)]
        runs: usize,

        /// Base seed; run i uses seed_base + i
        #[arg(long, default_value_t = 42)]
        seed_base: u64,
    },
}

/// Scenario parameters shared by both subcommands.
#[derive(Args)]
struct ScenarioArgs {
    /// Domain width in pixels
    #[arg(long, default_value_t = 1200.0)]
    width: f64,

    /// Domain height in pixels
    #[arg(long, default_value_t = 800.0)]
    height: f64,

    /// Number of beacons (K >= 1)
    #[arg(long, default_value_t = 1)]
    beacons: usize,

    /// Number of particles
    #[arg(long, default_value_t = 200)]
    particles: usize,

    /// Range sensor noise standard deviation
    #[arg(long, default_value_t = 20.0)]
    sensor_noise: f64,

    /// Grid cell size in pixels
    #[arg(long, default_value_t = 20.0)]
    grid_resolution: f64,

    /// Filter timestep in seconds
    #[arg(long, default_value_t = 0.05)]
    dt: f64,

    /// Number of discrete timesteps per run
    #[arg(long, default_value_t = 300)]
    steps: usize,
}

impl ScenarioArgs {
    fn to_config(&self) -> SimulationConfig {
        SimulationConfig {
            width: self.width,
            height: self.height,
            num_beacons: self.beacons,
            num_particles: self.particles,
            sensor_noise: self.sensor_noise,
            grid_resolution: self.grid_resolution,
            dt: self.dt,
            steps: self.steps,
            ..SimulationConfig::default()
        }
    }
}

fn init_logger(log_level: &str) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });
    builder.try_init()?;
    Ok(())
}

fn run_once(config: &SimulationConfig, seed: u64, output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let result = run_simulation(config, seed)?;
    info!(
        "seed {}: RMSE ekf={:.2} pf={:.2} grid={:.2} over {} steps",
        seed,
        result.rmse_ekf,
        result.rmse_pf,
        result.rmse_grid,
        result.records.len()
    );
    if let Some(path) = output {
        StepRecord::to_csv(&result.records, &path)?;
        info!("wrote {} step records to {}", result.records.len(), path.display());
    }
    Ok(())
}

fn benchmark(config: &SimulationConfig, runs: usize, seed_base: u64) -> Result<(), Box<dyn Error>> {
    info!("running {} simulations from seed base {}", runs, seed_base);
    let results: Result<Vec<RunResult>, _> = (0..runs)
        .into_par_iter()
        .map(|i| run_simulation(config, seed_base + i as u64))
        .collect();
    let results = results?;

    let ekf_rmse: Vec<f64> = results.iter().map(|r| r.rmse_ekf).collect();
    let pf_rmse: Vec<f64> = results.iter().map(|r| r.rmse_pf).collect();
    let grid_rmse: Vec<f64> = results.iter().map(|r| r.rmse_grid).collect();
    for (name, rmse) in [("EKF", &ekf_rmse), ("PF", &pf_rmse), ("Grid", &grid_rmse)] {
        let (mean, std, min, max) = summary_stats(rmse);
        info!(
            "{name} RMSE over {runs} runs: mean={mean:.3} std={std:.3} min={min:.3} max={max:.3}"
        );
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logger(&cli.log_level) {
        eprintln!("Failed to initialize logger: {e}");
    }

    let outcome = match cli.command {
        Command::Run {
            scenario,
            seed,
            output,
        } => run_once(&scenario.to_config(), seed, output),
        Command::Benchmark {
            scenario,
            runs,
            seed_base,
        } => benchmark(&scenario.to_config(), runs, seed_base),
    };

    if let Err(e) = outcome {
        error!("{e}");
        std::process::exit(1);
    }
}
