//! Fit sessions.
//!
//! A session owns one engine (and its scratch buffers), the parameter scaler
//! and the best-so-far record. Optimizers see only the scaled objective:
//!
//! 1. unscale the optimizer's point into physical parameters
//! 2. evaluate the engine
//! 3. fold `(params, residual, amplitudes)` into the best record
//!
//! Sessions are independent; [`fit_groups`] fits many on rayon workers.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{AmplitudeMode, FittedSignal, LineShape, ParameterBounds, SignalShape};
use crate::error::{FitError, FitResult};
use crate::fit::engine::FitEngine;
use crate::fit::layout::ParameterLayout;
use crate::fit::optimizer::BoundedOptimizer;
use crate::fit::scaling::{ParameterScaler, SCALE_MAX};

/// Best point seen during one optimization run, in physical units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestFit {
    pub params: Vec<f64>,
    pub residual: f64,
    /// Amplitude columns at this point.
    pub amplitudes: Vec<f64>,
}

/// Keep whichever record has the strictly smaller finite residual.
pub fn fold_best(best: Option<BestFit>, candidate: BestFit) -> Option<BestFit> {
    if !candidate.residual.is_finite() {
        return best;
    }
    match best {
        Some(b) if b.residual <= candidate.residual => Some(b),
        _ => Some(candidate),
    }
}

/// Final result of [`FitSession::optimize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub optimizer: String,
    pub residual: f64,
    pub parameter_names: Vec<String>,
    pub params: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub signals: Vec<FittedSignal>,
    pub evaluations: usize,
    pub iterations: usize,
    pub converged: bool,
}

/// Everything needed to fit one overlap group.
#[derive(Debug, Clone)]
pub struct FitGroup {
    pub signals: Vec<SignalShape>,
    pub mode: AmplitudeMode,
    pub line_shape: LineShape,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub bounds: ParameterBounds,
}

#[derive(Debug, Clone)]
pub struct FitSession {
    engine: FitEngine,
    scaler: ParameterScaler,
    best: Option<BestFit>,
    physical: Vec<f64>,
}

impl FitSession {
    pub fn new(
        signals: &[SignalShape],
        mode: AmplitudeMode,
        line_shape: LineShape,
        x: Vec<f64>,
        y: Vec<f64>,
        bounds: ParameterBounds,
    ) -> FitResult<Self> {
        let engine = FitEngine::new(signals, mode, line_shape, x, y)?;
        engine.layout().check_len("start values", &bounds.start)?;
        let scaler = ParameterScaler::new(bounds)?;

        debug!(
            samples = engine.x().len(),
            parameters = scaler.len(),
            free = scaler.free_dims(),
            "fit session ready"
        );

        Ok(Self {
            physical: Vec::with_capacity(scaler.len()),
            engine,
            scaler,
            best: None,
        })
    }

    pub fn from_group(group: FitGroup) -> FitResult<Self> {
        Self::new(
            &group.signals,
            group.mode,
            group.line_shape,
            group.x,
            group.y,
            group.bounds,
        )
    }

    pub fn layout(&self) -> &ParameterLayout {
        self.engine.layout()
    }

    pub fn scaler(&self) -> &ParameterScaler {
        &self.scaler
    }

    pub fn x(&self) -> &[f64] {
        self.engine.x()
    }

    pub fn y(&self) -> &[f64] {
        self.engine.y()
    }

    pub fn best(&self) -> Option<&BestFit> {
        self.best.as_ref()
    }

    /// Objective in scaled coordinates (free dimensions only).
    pub fn evaluate_scaled(&mut self, scaled: &[f64]) -> FitResult<f64> {
        self.scaler.unscale_into(scaled, &mut self.physical)?;
        let eval = self.engine.evaluate(&self.physical)?;
        self.best = fold_best(
            self.best.take(),
            BestFit {
                params: self.physical.clone(),
                residual: eval.residual,
                amplitudes: eval.amplitudes,
            },
        );
        Ok(eval.residual)
    }

    /// Objective at a physical parameter vector; folds into the best record.
    pub fn evaluate_physical(&mut self, params: &[f64]) -> FitResult<f64> {
        let eval = self.engine.evaluate(params)?;
        self.best = fold_best(
            self.best.take(),
            BestFit {
                params: params.to_vec(),
                residual: eval.residual,
                amplitudes: eval.amplitudes,
            },
        );
        Ok(eval.residual)
    }

    /// RMS residual of a single point, replacing any previous best record.
    pub fn rms(&mut self, params: &[f64]) -> FitResult<f64> {
        self.best = None;
        self.evaluate_physical(params)
    }

    /// Run `optimizer` over `[0, 100]^d` from the scaled start values.
    pub fn optimize(&mut self, optimizer: &dyn BoundedOptimizer) -> FitResult<FitReport> {
        let start = self.scaler.scaled_start();
        let d = start.len();
        let lower = vec![0.0; d];
        let upper = vec![SCALE_MAX; d];

        self.best = None;
        let mut failure: Option<FitError> = None;
        let outcome = {
            let mut objective = |z: &[f64]| match self.evaluate_scaled(z) {
                Ok(v) => v,
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                    f64::NAN
                }
            };
            optimizer.minimize(&mut objective, &start, &lower, &upper)
        };
        if let Some(err) = failure {
            return Err(err);
        }
        let outcome = outcome?;

        let best = self.best.clone().ok_or(FitError::NoBestPoint)?;
        let signals = self.engine.decode(&best.params, &best.amplitudes)?;

        info!(
            optimizer = optimizer.name(),
            residual = best.residual,
            evaluations = outcome.evaluations,
            iterations = outcome.iterations,
            converged = outcome.converged,
            "fit finished"
        );

        Ok(FitReport {
            optimizer: optimizer.name().to_string(),
            residual: best.residual,
            parameter_names: self.layout().parameter_names(),
            params: best.params,
            amplitudes: best.amplitudes,
            signals,
            evaluations: outcome.evaluations,
            iterations: outcome.iterations,
            converged: outcome.converged,
        })
    }

    /// Decode the best record into signals.
    pub fn signals(&self) -> FitResult<Vec<FittedSignal>> {
        let best = self.best.as_ref().ok_or(FitError::NoBestPoint)?;
        self.engine.decode(&best.params, &best.amplitudes)
    }

    pub fn model_values(&mut self, params: &[f64]) -> FitResult<Vec<f64>> {
        self.engine.model_values(params)
    }

    /// Position whose `±half_window` neighbourhood has the largest summed
    /// positive excess of observed over modeled intensity.
    ///
    /// Useful for locating a signal the model is missing. `None` when the
    /// window does not fit in the data.
    pub fn max_positive_deviation(
        &mut self,
        params: &[f64],
        half_window: usize,
    ) -> FitResult<Option<f64>> {
        let model = self.engine.model_values(params)?;
        let x = self.engine.x();
        let y = self.engine.y();
        let n = x.len();
        if n < 2 * half_window + 1 {
            return Ok(None);
        }

        let mut best: Option<(f64, f64)> = None;
        for i in half_window..n - half_window {
            let excess: f64 = (i - half_window..=i + half_window)
                .map(|k| (y[k] - model[k]).max(0.0))
                .sum();
            if best.is_none_or(|(b, _)| excess > b) {
                best = Some((excess, x[i]));
            }
        }
        Ok(best.map(|(_, pos)| pos))
    }
}

/// Fit independent groups in parallel, one session per group.
pub fn fit_groups(
    groups: Vec<FitGroup>,
    optimizer: &dyn BoundedOptimizer,
) -> Vec<FitResult<FitReport>> {
    groups
        .into_par_iter()
        .map(|group| {
            let mut session = FitSession::from_group(group)?;
            session.optimize(optimizer)
        })
        .collect()
}
