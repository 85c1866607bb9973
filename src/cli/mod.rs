//! Command-line parsing for the multiplet fitter.
//!
//! Argument parsing and command dispatch stay separate from the
//! modeling/math code.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::{CouplingItem, OptimizerKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mfit", version, about = "NMR multiplet synthesis and spectral fitting")]
pub struct Cli {
    /// Increase log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the lines of a coupling pattern.
    Pattern(PatternArgs),
    /// Synthesize a spectrum from a fit request's start values.
    Simulate(SimulateArgs),
    /// Fit a request's signals to a spectrum and print diagnostics.
    Fit(FitArgs),
}

/// One `J:multiplicity[:antiphase]` coupling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CouplingArg(pub CouplingItem);

impl FromStr for CouplingArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let (j, m, ap) = match parts.as_slice() {
            [j, m] => (*j, *m, "0"),
            [j, m, ap] => (*j, *m, *ap),
            _ => return Err(format!("expected J:multiplicity[:antiphase], got '{s}'")),
        };
        let coupling: f64 = j.parse().map_err(|e| format!("coupling '{j}': {e}"))?;
        let multiplicity: u32 = m.parse().map_err(|e| format!("multiplicity '{m}': {e}"))?;
        let antiphase: f64 = ap.parse().map_err(|e| format!("antiphase '{ap}': {e}"))?;
        Ok(CouplingArg(CouplingItem::new(coupling, antiphase, multiplicity)))
    }
}

#[derive(Debug, Parser, Clone)]
pub struct PatternArgs {
    /// Coupling as `J:multiplicity[:antiphase]`; repeat for more couplings.
    #[arg(short = 'c', long = "coupling", value_name = "J:N[:AP]")]
    pub couplings: Vec<CouplingArg>,

    /// Overall pattern intensity.
    #[arg(long, default_value_t = 1.0)]
    pub intensity: f64,

    /// Print the pattern as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Fit request JSON whose start values define the spectrum.
    #[arg(long, value_name = "JSON")]
    pub request: PathBuf,

    /// Number of samples on the axis `0..points`.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub points: usize,

    /// Standard deviation of additive Gaussian noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Output CSV (`x,y`).
    #[arg(short = 'o', long, value_name = "CSV")]
    pub out: PathBuf,
}

/// Options for fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Fit request JSON (signals, bounds, amplitude mode, line shape).
    #[arg(long, value_name = "JSON")]
    pub request: PathBuf,

    /// Spectrum CSV (`x,y`). Without it the request's start values are
    /// simulated on `0..points` with `--noise`.
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Samples to simulate when `--data` is absent.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub points: usize,

    /// Noise standard deviation when simulating.
    #[arg(long, default_value_t = 0.001)]
    pub noise: f64,

    /// Optimizer: local trust-region refinement or global CMA-ES.
    #[arg(long, value_enum, default_value_t = OptimizerKind::Local)]
    pub optimizer: OptimizerKind,

    /// Objective evaluation budget (defaults per optimizer).
    #[arg(long)]
    pub max_evaluations: Option<usize>,

    /// Trust-region interpolation points, `d+2..=(d+1)(d+2)/2` (default the upper end).
    #[arg(long)]
    pub interpolation_points: Option<usize>,

    /// Trust-region initial radius (scaled units).
    #[arg(long, default_value_t = 10.0)]
    pub initial_radius: f64,

    /// Trust-region final radius (scaled units).
    #[arg(long, default_value_t = 1e-6)]
    pub final_radius: f64,

    /// CMA-ES population multiplier.
    #[arg(long, default_value_t = 3.0)]
    pub population_multiplier: f64,

    /// CMA-ES initial step size (scaled units).
    #[arg(long, default_value_t = 10.0)]
    pub sigma: f64,

    /// CMA-ES per-dimension initial step sizes, one per free parameter
    /// (comma separated); overrides `--sigma`.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub sigmas: Option<Vec<f64>>,

    /// CMA-ES relative/absolute convergence tolerance.
    #[arg(long, default_value_t = 1e-5)]
    pub tolerance: f64,

    /// CMA-ES generation cap.
    #[arg(long, default_value_t = 1000)]
    pub max_iterations: usize,

    /// Random seed (CMA-ES sampling and simulated noise).
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Print the per-sample residual table.
    #[arg(long)]
    pub residuals: bool,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the fit result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export observed/model/residual per sample to CSV.
    #[arg(long = "export-model", value_name = "CSV")]
    pub export_model: Option<PathBuf>,
}
