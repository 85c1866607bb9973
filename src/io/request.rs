//! Fit request JSON.
//!
//! A request describes the signals to fit with explicit bounds for every
//! parameter:
//!
//! ```json
//! {
//!   "mode": "separable",
//!   "line_shape": { "kind": "absorptive" },
//!   "signals": [
//!     {
//!       "kind": "coupled",
//!       "linewidth": { "start": 2.2, "lower": 1.0, "upper": 3.0 },
//!       "amplitude": { "start": 1.0, "lower": 0.0, "upper": 10.0 },
//!       "center":    { "start": 13.0, "lower": 10.0, "upper": 20.0 },
//!       "couplings": [
//!         { "multiplicity": 2, "coupling": { "start": 9.0, "lower": 8.0, "upper": 13.0 } }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Anti-phase factors default to a parameter fixed at 0. Amplitude bounds are
//! required in direct mode; in separable mode only their start value is read
//! (as the amplitude used when simulating the request).

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{AmplitudeMode, LineShape, ParamBound, ParameterBounds, SignalShape};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRequest {
    #[serde(default = "default_mode")]
    pub mode: AmplitudeMode,
    #[serde(default)]
    pub line_shape: LineShape,
    pub signals: Vec<SignalRequest>,
}

fn default_mode() -> AmplitudeMode {
    AmplitudeMode::Separable
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalRequest {
    Coupled {
        linewidth: ParamBound,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amplitude: Option<ParamBound>,
        center: ParamBound,
        #[serde(default)]
        couplings: Vec<CouplingRequest>,
    },
    Generic {
        linewidth: ParamBound,
        lines: Vec<LineRequest>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingRequest {
    pub multiplicity: u32,
    pub coupling: ParamBound,
    #[serde(default = "fixed_zero")]
    pub antiphase: ParamBound,
}

fn fixed_zero() -> ParamBound {
    ParamBound::fixed(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRequest {
    pub frequency: ParamBound,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<ParamBound>,
}

/// A request resolved into the fitting core's inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FitProblem {
    pub mode: AmplitudeMode,
    pub line_shape: LineShape,
    pub signals: Vec<SignalShape>,
    /// Bounds in parameter-layout order.
    pub bounds: ParameterBounds,
    /// Start amplitude per amplitude column (1 when unspecified).
    pub amplitudes: Vec<f64>,
}

impl FitRequest {
    pub fn to_problem(&self) -> Result<FitProblem, AppError> {
        if self.signals.is_empty() {
            return Err(AppError::new(2, "Fit request has no signals."));
        }
        let direct = self.mode.fits_amplitudes();
        let mut signals = Vec::with_capacity(self.signals.len());
        let mut bounds = ParameterBounds::default();
        let mut amplitudes = Vec::new();

        for (i, signal) in self.signals.iter().enumerate() {
            match signal {
                SignalRequest::Coupled {
                    linewidth,
                    amplitude,
                    center,
                    couplings,
                } => {
                    signals.push(SignalShape::coupled(
                        couplings.iter().map(|c| c.multiplicity).collect::<Vec<_>>(),
                    ));
                    bounds.push(*linewidth);
                    if direct {
                        bounds.push(require_amplitude(*amplitude, i)?);
                    }
                    bounds.push(*center);
                    for c in couplings {
                        bounds.push(c.coupling);
                        bounds.push(c.antiphase);
                    }
                    amplitudes.push(amplitude.map_or(1.0, |a| a.start));
                }
                SignalRequest::Generic { linewidth, lines } => {
                    signals.push(SignalShape::generic(lines.len()));
                    bounds.push(*linewidth);
                    for line in lines {
                        if direct {
                            bounds.push(require_amplitude(line.amplitude, i)?);
                        }
                        bounds.push(line.frequency);
                        amplitudes.push(line.amplitude.map_or(1.0, |a| a.start));
                    }
                }
            }
        }

        Ok(FitProblem {
            mode: self.mode,
            line_shape: self.line_shape,
            signals,
            bounds,
            amplitudes,
        })
    }
}

fn require_amplitude(amplitude: Option<ParamBound>, signal: usize) -> Result<ParamBound, AppError> {
    amplitude.ok_or_else(|| {
        AppError::new(
            2,
            format!("Signal {signal}: amplitude bounds are required in direct mode."),
        )
    })
}

/// Read a fit request JSON file.
pub fn read_fit_request(path: &Path) -> Result<FitRequest, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open fit request '{}': {e}", path.display()))
    })?;
    let request: FitRequest = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid fit request JSON: {e}")))?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SIGNALS: &str = r#"{
        "signals": [
            {
                "kind": "coupled",
                "linewidth": { "start": 2.2, "lower": 1.0, "upper": 3.0 },
                "amplitude": { "start": 2.0, "lower": 0.0, "upper": 5.0 },
                "center": { "start": 13.0, "lower": 10.0, "upper": 20.0 },
                "couplings": [
                    { "multiplicity": 2, "coupling": { "start": 9.0, "lower": 8.0, "upper": 13.0 } }
                ]
            },
            {
                "kind": "generic",
                "linewidth": { "start": 3.0, "lower": 1.0, "upper": 5.0 },
                "lines": [
                    { "frequency": { "start": 40.0, "lower": 35.0, "upper": 45.0 } },
                    { "frequency": { "start": 60.0, "lower": 55.0, "upper": 65.0 },
                      "amplitude": { "start": 0.5, "lower": 0.0, "upper": 2.0 } }
                ]
            }
        ]
    }"#;

    #[test]
    fn separable_request_resolves_in_layout_order() {
        let request: FitRequest = serde_json::from_str(TWO_SIGNALS).unwrap();
        assert_eq!(request.mode, AmplitudeMode::Separable);
        assert_eq!(request.line_shape, LineShape::Absorptive);

        let problem = request.to_problem().unwrap();
        assert_eq!(
            problem.signals,
            vec![SignalShape::coupled(vec![2]), SignalShape::generic(2)]
        );
        assert_eq!(
            problem.bounds.start,
            vec![2.2, 13.0, 9.0, 0.0, 3.0, 40.0, 60.0]
        );
        assert_eq!(problem.bounds.lower[3], 0.0);
        assert_eq!(problem.bounds.upper[3], 0.0);
        assert_eq!(problem.amplitudes, vec![2.0, 1.0, 0.5]);
    }

    #[test]
    fn direct_mode_requires_amplitudes() {
        let mut request: FitRequest = serde_json::from_str(TWO_SIGNALS).unwrap();
        request.mode = AmplitudeMode::Direct;
        let err = request.to_problem().unwrap_err();
        assert_eq!(err.exit_code(), 2);

        request.signals.truncate(1);
        let problem = request.to_problem().unwrap();
        assert_eq!(problem.bounds.start, vec![2.2, 2.0, 13.0, 9.0, 0.0]);
    }

    #[test]
    fn mixed_line_shape_parses() {
        let json = r#"{
            "mode": "direct",
            "line_shape": { "kind": "mixed", "real": 0.9, "imag": 0.1 },
            "signals": []
        }"#;
        let request: FitRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.line_shape, LineShape::Mixed { real: 0.9, imag: 0.1 });
        assert!(request.to_problem().is_err());
    }

    #[test]
    fn reads_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, TWO_SIGNALS).unwrap();
        let request = read_fit_request(&path).unwrap();
        assert_eq!(request.signals.len(), 2);

        assert_eq!(read_fit_request(&dir.path().join("missing.json")).unwrap_err().exit_code(), 2);
    }
}
