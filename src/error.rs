//! Error types.
//!
//! - [`FitError`] is raised by the fitting core (layout, engine, optimizers).
//! - [`AppError`] carries a process exit code for the `mfit` binary and wraps
//!   IO/parse failures plus any `FitError` bubbling up from the pipeline.

use thiserror::Error;

/// Failures raised by the fitting core.
///
/// Precondition violations are reported immediately and never truncated or
/// padded away. Optimizer exhaustion is a separate variant so callers can
/// retry with a larger budget or wider bounds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("{what}: expected length {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("signal {index}: {reason}")]
    InvalidSignal { index: usize, reason: String },

    #[error("invalid coupling pattern: {0}")]
    InvalidPattern(String),

    #[error("parameter {index}: {reason}")]
    InvalidBounds { index: usize, reason: String },

    #[error("invalid sample data: {0}")]
    InvalidData(String),

    #[error("invalid optimizer options: {0}")]
    InvalidOptions(String),

    #[error("no objective evaluation recorded a finite residual")]
    NoBestPoint,

    #[error("failure to fit data: {optimizer} stopped after {evaluations} evaluations: {message}")]
    OptimizerExhausted {
        optimizer: &'static str,
        evaluations: usize,
        message: String,
    },
}

impl FitError {
    /// True for caller mistakes (bad shapes, bounds, options) as opposed to
    /// numerical outcomes of a well-posed fit.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            FitError::OptimizerExhausted { .. } | FitError::NoBestPoint
        )
    }
}

pub type FitResult<T> = Result<T, FitError>;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match &err {
            FitError::OptimizerExhausted { .. } => 5,
            FitError::NoBestPoint => 4,
            _ => 3,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_maps_to_its_own_exit_code() {
        let err = FitError::OptimizerExhausted {
            optimizer: "trust-region",
            evaluations: 10,
            message: "budget".to_string(),
        };
        assert!(!err.is_precondition());
        let app: AppError = err.into();
        assert_eq!(app.exit_code(), 5);
        assert!(app.to_string().contains("failure to fit data"));
    }

    #[test]
    fn dimension_mismatch_is_a_precondition() {
        let err = FitError::DimensionMismatch {
            what: "parameters",
            expected: 4,
            found: 3,
        };
        assert!(err.is_precondition());
        assert_eq!(AppError::from(err).exit_code(), 3);
    }
}
