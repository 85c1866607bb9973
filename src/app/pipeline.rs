//! Shared fit pipeline.
//!
//! request -> spectrum (read or simulated) -> session -> optimize -> residuals
//!
//! Front-ends only decide how to present the returned [`RunOutput`].

use crate::data::{SimulationSpec, sample_axis, simulate_spectrum};
use crate::domain::{FitConfig, OptimizerKind};
use crate::error::AppError;
use crate::fit::{
    BoundedOptimizer, CovarianceEvolution, EvolutionOptions, FitReport, FitSession, TrustRegion,
    TrustRegionOptions,
};
use crate::io::{FitProblem, Spectrum, read_fit_request, read_spectrum_csv};
use crate::report::{ResidualRankings, ResidualRow};

/// Samples listed on each side of the residual rankings.
const RANKED_SAMPLES: usize = 5;

/// All computed outputs of a single `mfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub problem: FitProblem,
    pub spectrum: Spectrum,
    pub report: FitReport,
    pub model: Vec<f64>,
    pub residuals: Vec<ResidualRow>,
    pub rankings: ResidualRankings,
}

/// Execute the full fitting pipeline.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let problem = read_fit_request(&config.request_path)?.to_problem()?;

    let spectrum = match &config.data_path {
        Some(path) => read_spectrum_csv(path)?,
        None => simulate_problem(
            &problem,
            config.simulated_points,
            config.simulated_noise,
            config.seed,
        )?,
    };

    run_fit_on(config, problem, spectrum)
}

/// Fit an already resolved problem against `spectrum`.
pub fn run_fit_on(
    config: &FitConfig,
    problem: FitProblem,
    spectrum: Spectrum,
) -> Result<RunOutput, AppError> {
    let mut session = FitSession::new(
        &problem.signals,
        problem.mode,
        problem.line_shape,
        spectrum.x.clone(),
        spectrum.y.clone(),
        problem.bounds.clone(),
    )?;

    let optimizer = build_optimizer(config);
    let report = session.optimize(optimizer.as_ref())?;

    let model = session.model_values(&report.params)?;
    let residuals = crate::report::compute_residuals(&spectrum.x, &spectrum.y, &model)?;
    let rankings = crate::report::rank_residuals(&residuals, RANKED_SAMPLES);

    Ok(RunOutput {
        problem,
        spectrum,
        report,
        model,
        residuals,
        rankings,
    })
}

/// Synthesize the spectrum described by the problem's start values.
pub fn simulate_problem(
    problem: &FitProblem,
    points: usize,
    noise_sd: f64,
    seed: u64,
) -> Result<Spectrum, AppError> {
    if points == 0 {
        return Err(AppError::new(2, "Simulation needs at least one point."));
    }
    let x = sample_axis(points);
    let y = simulate_spectrum(
        &SimulationSpec {
            signals: &problem.signals,
            mode: problem.mode,
            line_shape: problem.line_shape,
            params: &problem.bounds.start,
            amplitudes: &problem.amplitudes,
            noise_sd,
            seed,
        },
        &x,
    )?;
    Ok(Spectrum { x, y })
}

/// Optimizer selected and tuned by the config.
pub fn build_optimizer(config: &FitConfig) -> Box<dyn BoundedOptimizer> {
    match config.optimizer {
        OptimizerKind::Local => {
            let defaults = TrustRegionOptions::default();
            Box::new(TrustRegion::new(TrustRegionOptions {
                interpolation_points: config.interpolation_points,
                initial_radius: config.initial_radius,
                final_radius: config.final_radius,
                max_evaluations: config.max_evaluations.unwrap_or(defaults.max_evaluations),
            }))
        }
        OptimizerKind::Global => {
            let defaults = EvolutionOptions::default();
            Box::new(CovarianceEvolution::new(EvolutionOptions {
                population_multiplier: config.population_multiplier,
                sigma: config.sigma,
                sigmas: config.sigmas.clone(),
                relative_tolerance: config.tolerance,
                absolute_tolerance: config.tolerance,
                max_iterations: config.max_iterations,
                max_evaluations: config.max_evaluations.unwrap_or(defaults.max_evaluations),
                seed: config.seed,
                ..defaults
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AmplitudeMode, FittedSignal, LineShape, ParamBound, SignalShape};

    fn config(optimizer: OptimizerKind) -> FitConfig {
        FitConfig {
            request_path: "request.json".into(),
            data_path: None,
            simulated_points: 100,
            simulated_noise: 0.001,
            optimizer,
            max_evaluations: None,
            interpolation_points: None,
            initial_radius: 10.0,
            final_radius: 1e-6,
            population_multiplier: 3.0,
            sigma: 10.0,
            sigmas: None,
            tolerance: 1e-5,
            max_iterations: 1000,
            seed: 1,
            show_residuals: false,
            plot: false,
            plot_width: 100,
            plot_height: 25,
            export_result: None,
            export_model: None,
        }
    }

    fn doublet_problem(start: [f64; 3]) -> FitProblem {
        let [lw, center, j] = start;
        FitProblem {
            mode: AmplitudeMode::Separable,
            line_shape: LineShape::Absorptive,
            signals: vec![SignalShape::coupled(vec![2])],
            bounds: [
                ParamBound::new(lw, 1.0, 3.0),
                ParamBound::new(center, 25.0, 35.0),
                ParamBound::new(j, 8.0, 12.0),
                ParamBound::fixed(0.0),
            ]
            .into_iter()
            .collect(),
            amplitudes: vec![1.0],
        }
    }

    #[test]
    fn simulated_problem_refits_to_truth() {
        let truth = doublet_problem([2.0, 30.0, 10.0]);
        let spectrum = simulate_problem(&truth, 60, 0.0, 1).unwrap();

        let start = doublet_problem([2.5, 28.0, 9.0]);
        let run = run_fit_on(&config(OptimizerKind::Local), start, spectrum).unwrap();

        assert!(run.report.residual < 0.01, "{}", run.report.residual);
        let FittedSignal::Coupled { center, couplings, .. } = &run.report.signals[0] else {
            panic!("expected coupled signal");
        };
        assert!((center - 30.0).abs() < 0.3, "{center}");
        assert!((couplings[0].coupling - 10.0).abs() < 0.1);
        assert_eq!(run.model.len(), 60);
        assert_eq!(run.residuals.len(), 60);
    }

    #[test]
    fn zero_points_is_rejected() {
        let err = simulate_problem(&doublet_problem([2.0, 30.0, 10.0]), 0, 0.0, 1).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn optimizer_follows_config() {
        assert_eq!(build_optimizer(&config(OptimizerKind::Local)).name(), "trust-region");
        assert_eq!(build_optimizer(&config(OptimizerKind::Global)).name(), "cma-es");
    }
}
