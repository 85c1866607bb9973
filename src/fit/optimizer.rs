//! Bounded derivative-free optimizer interface.
//!
//! Optimizers minimize a scalar objective over a box. The fit session hands
//! them the scaled objective over `[0, 100]^d`; they know nothing about
//! signals or spectra.

use crate::error::{FitError, FitResult};

/// Result of one optimizer run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    /// Best point evaluated.
    pub point: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub iterations: usize,
    /// False when the run ended on an iteration cap rather than a tolerance.
    pub converged: bool,
}

pub trait BoundedOptimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimize `objective` starting at `start` inside `[lower, upper]`.
    ///
    /// NaN objective values are treated as `+inf`. Running out of evaluations
    /// is an error ([`FitError::OptimizerExhausted`]).
    fn minimize(
        &self,
        objective: &mut dyn FnMut(&[f64]) -> f64,
        start: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> FitResult<OptimOutcome>;
}

/// Check that `start`, `lower` and `upper` describe a usable box.
pub fn check_box(start: &[f64], lower: &[f64], upper: &[f64]) -> FitResult<()> {
    let n = start.len();
    for (what, len) in [("lower bounds", lower.len()), ("upper bounds", upper.len())] {
        if len != n {
            return Err(FitError::DimensionMismatch {
                what,
                expected: n,
                found: len,
            });
        }
    }
    for i in 0..n {
        if !(lower[i] <= start[i] && start[i] <= upper[i]) {
            return Err(FitError::InvalidBounds {
                index: i,
                reason: format!(
                    "start {} outside [{}, {}]",
                    start[i], lower[i], upper[i]
                ),
            });
        }
    }
    Ok(())
}

/// Objective wrapper that counts evaluations, enforces the budget and keeps
/// the best point seen.
pub(crate) struct CountedObjective<'a> {
    objective: &'a mut dyn FnMut(&[f64]) -> f64,
    optimizer: &'static str,
    max_evaluations: usize,
    evaluations: usize,
    best_point: Vec<f64>,
    best_value: f64,
}

impl<'a> CountedObjective<'a> {
    pub(crate) fn new(
        objective: &'a mut dyn FnMut(&[f64]) -> f64,
        optimizer: &'static str,
        max_evaluations: usize,
        start: &[f64],
    ) -> Self {
        Self {
            objective,
            optimizer,
            max_evaluations,
            evaluations: 0,
            best_point: start.to_vec(),
            best_value: f64::INFINITY,
        }
    }

    pub(crate) fn eval(&mut self, x: &[f64]) -> FitResult<f64> {
        if self.evaluations >= self.max_evaluations {
            return Err(FitError::OptimizerExhausted {
                optimizer: self.optimizer,
                evaluations: self.evaluations,
                message: format!("maximal count ({}) exceeded", self.max_evaluations),
            });
        }
        self.evaluations += 1;

        let v = (self.objective)(x);
        let v = if v.is_nan() { f64::INFINITY } else { v };
        if v < self.best_value {
            self.best_value = v;
            self.best_point.clear();
            self.best_point.extend_from_slice(x);
        }
        Ok(v)
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub(crate) fn best_value(&self) -> f64 {
        self.best_value
    }

    pub(crate) fn finish(self, iterations: usize, converged: bool) -> OptimOutcome {
        OptimOutcome {
            point: self.best_point,
            value: self.best_value,
            evaluations: self.evaluations,
            iterations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_objective_tracks_best_and_budget() {
        let mut f = |x: &[f64]| if x[0] < 0.0 { f64::NAN } else { x[0] * x[0] };
        let mut counted = CountedObjective::new(&mut f, "test", 3, &[5.0]);

        assert_eq!(counted.eval(&[2.0]).unwrap(), 4.0);
        assert_eq!(counted.eval(&[-1.0]).unwrap(), f64::INFINITY);
        assert_eq!(counted.eval(&[1.0]).unwrap(), 1.0);
        assert!(matches!(
            counted.eval(&[0.0]),
            Err(FitError::OptimizerExhausted { evaluations: 3, .. })
        ));

        let outcome = counted.finish(1, true);
        assert_eq!(outcome.point, vec![1.0]);
        assert_eq!(outcome.value, 1.0);
        assert_eq!(outcome.evaluations, 3);
    }

    #[test]
    fn box_check_rejects_start_outside() {
        assert!(check_box(&[1.0], &[0.0], &[2.0]).is_ok());
        assert!(matches!(
            check_box(&[3.0], &[0.0], &[2.0]),
            Err(FitError::InvalidBounds { index: 0, .. })
        ));
        assert!(check_box(&[1.0], &[0.0, 0.0], &[2.0]).is_err());
    }
}
