//! Top-level application orchestration.
//!
//! `src/main.rs` is tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - synthesizes coupling patterns and spectra
//! - runs the fit pipeline
//! - prints reports/plots and writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, FitArgs, PatternArgs, SimulateArgs};
use crate::domain::FitConfig;
use crate::error::AppError;
use crate::models::CouplingPattern;

pub mod pipeline;

/// Entry point for the `mfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Pattern(args) => handle_pattern(&args),
        Command::Simulate(args) => handle_simulate(&args),
        Command::Fit(args) => handle_fit(&args),
    }
}

/// Log to stderr; `RUST_LOG` wins over the `-v` count.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_pattern(args: &PatternArgs) -> Result<(), AppError> {
    let items = args.couplings.iter().map(|c| c.0).collect();
    let pattern = CouplingPattern::new(items, args.intensity)?;

    if args.json {
        let json = serde_json::to_string_pretty(&pattern)
            .map_err(|e| AppError::new(2, format!("Failed to encode pattern JSON: {e}")))?;
        println!("{json}");
    } else {
        print!("{}", crate::report::format_pattern(&pattern));
    }
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let problem = crate::io::read_fit_request(&args.request)?.to_problem()?;
    let spectrum = pipeline::simulate_problem(&problem, args.points, args.noise, args.seed)?;
    crate::io::write_spectrum_csv(&args.out, &spectrum.x, &spectrum.y)?;
    println!(
        "Wrote {} samples to {}",
        spectrum.len(),
        args.out.display()
    );
    Ok(())
}

fn handle_fit(args: &FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(args);
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_fit_summary(&run.report, &config, run.spectrum.len())
    );
    println!("{}", crate::report::format_signals(&run.report.signals));
    println!("{}", crate::report::format_rankings(&run.rankings));

    if config.show_residuals {
        println!("{}", crate::report::format_residual_table(&run.residuals));
    }

    if config.plot {
        let plot = crate::plot::render_spectrum_plot(
            &run.spectrum.x,
            &run.spectrum.y,
            &run.model,
            config.plot_width,
            config.plot_height,
            Some(&run.rankings),
        );
        println!("{plot}");
    }

    // Optional exports.
    if let Some(path) = &config.export_result {
        crate::io::write_result_json(
            path,
            &run.report,
            run.problem.mode,
            run.problem.line_shape,
            run.spectrum.len(),
        )?;
    }
    if let Some(path) = &config.export_model {
        crate::io::write_model_csv(path, &run.spectrum.x, &run.spectrum.y, &run.model)?;
    }

    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        request_path: args.request.clone(),
        data_path: args.data.clone(),
        simulated_points: args.points,
        simulated_noise: args.noise,
        optimizer: args.optimizer,
        max_evaluations: args.max_evaluations,
        interpolation_points: args.interpolation_points,
        initial_radius: args.initial_radius,
        final_radius: args.final_radius,
        population_multiplier: args.population_multiplier,
        sigma: args.sigma,
        sigmas: args.sigmas.clone(),
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
        seed: args.seed,
        show_residuals: args.residuals,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_result: args.export.clone(),
        export_model: args.export_model.clone(),
    }
}
