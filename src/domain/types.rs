//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - read from fit-request JSON
//! - exported with fit results

use std::cmp::Ordering;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Largest multiplicity a single coupling may split a line into.
///
/// Amplitudes come from rows `0..MAX_MULTIPLICITY` of Pascal's triangle.
pub const MAX_MULTIPLICITY: u32 = 16;

/// Largest number of lines one signal may expand into.
pub const MAX_LINES: usize = 1 << 16;

/// Product of `multiplicities`, or `None` when it exceeds [`MAX_LINES`].
pub fn checked_line_count(multiplicities: impl IntoIterator<Item = u32>) -> Option<usize> {
    multiplicities
        .into_iter()
        .try_fold(1usize, |total, m| total.checked_mul(m as usize))
        .filter(|&total| total <= MAX_LINES)
}

/// One scalar coupling: the splitting constant `J`, an anti-phase
/// ("roofing") factor, and the number of lines it produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CouplingItem {
    pub coupling: f64,
    #[serde(default)]
    pub antiphase: f64,
    pub multiplicity: u32,
}

impl CouplingItem {
    pub const fn new(coupling: f64, antiphase: f64, multiplicity: u32) -> Self {
        Self {
            coupling,
            antiphase,
            multiplicity,
        }
    }

    /// A coupling with no anti-phase correction.
    pub const fn plain(coupling: f64, multiplicity: u32) -> Self {
        Self::new(coupling, 0.0, multiplicity)
    }

    /// Order by coupling magnitude (the order the splitting cascade needs).
    pub fn cmp_coupling(&self, other: &Self) -> Ordering {
        self.coupling.total_cmp(&other.coupling)
    }

    /// Multiplicity letter used in multiplet labels (`d`, `t`, `q`, ...).
    pub fn multiplicity_letter(&self) -> char {
        match self.multiplicity {
            2 => 'd',
            3 => 't',
            4 => 'q',
            5 => 'p',
            6 => 'h',
            7 => 'x',
            _ => 'm',
        }
    }
}

/// Structure of one fitted spectral feature.
///
/// A coupled multiplet carries one amplitude, one center and one
/// `(J, antiphase)` pair per entry in `multiplicities`; an empty list is a
/// singlet. A generic multiplet is `lines` independently floating
/// `(frequency, amplitude)` pairs with no coupling structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalShape {
    Coupled { multiplicities: Vec<u32> },
    Generic { lines: usize },
}

impl SignalShape {
    pub fn coupled(multiplicities: impl Into<Vec<u32>>) -> Self {
        SignalShape::Coupled {
            multiplicities: multiplicities.into(),
        }
    }

    pub fn singlet() -> Self {
        SignalShape::Coupled {
            multiplicities: Vec::new(),
        }
    }

    pub fn generic(lines: usize) -> Self {
        SignalShape::Generic { lines }
    }

    /// Decode the legacy multiplicity encoding.
    ///
    /// A single negative multiplicity `-m` denotes a generic multiplet with
    /// `m` lines; any other negative or zero entry is rejected.
    pub fn from_legacy(multiplicities: &[i32]) -> Result<Self, String> {
        if let [m] = multiplicities {
            if *m < 0 {
                return Ok(SignalShape::Generic {
                    lines: m.unsigned_abs() as usize,
                });
            }
        }
        let mut out = Vec::with_capacity(multiplicities.len());
        for &m in multiplicities {
            if m <= 0 {
                return Err(format!(
                    "multiplicity {m} is only valid as the single entry of a generic multiplet"
                ));
            }
            out.push(m as u32);
        }
        Ok(SignalShape::Coupled {
            multiplicities: out,
        })
    }

    /// Number of spectral lines this signal produces (saturating; see
    /// [`SignalShape::validate`] for the bound).
    pub fn line_count(&self) -> usize {
        match self {
            SignalShape::Coupled { multiplicities } => multiplicities
                .iter()
                .fold(1usize, |total, &m| total.saturating_mul(m as usize)),
            SignalShape::Generic { lines } => *lines,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, SignalShape::Generic { .. })
    }

    /// Check internal consistency (multiplicity range, line count, non-empty
    /// generic).
    pub fn validate(&self) -> Result<(), String> {
        match self {
            SignalShape::Coupled { multiplicities } => {
                for (k, &m) in multiplicities.iter().enumerate() {
                    if m == 0 || m > MAX_MULTIPLICITY {
                        return Err(format!(
                            "coupling {k} has multiplicity {m}; expected 1..={MAX_MULTIPLICITY}"
                        ));
                    }
                }
                if checked_line_count(multiplicities.iter().copied()).is_none() {
                    return Err(format!(
                        "multiplicities {multiplicities:?} expand to more than {MAX_LINES} lines"
                    ));
                }
                Ok(())
            }
            SignalShape::Generic { lines } => {
                if *lines == 0 {
                    Err("generic multiplet needs at least one line".to_string())
                } else if *lines > MAX_LINES {
                    Err(format!("generic multiplet has {lines} lines; at most {MAX_LINES}"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// How line amplitudes are obtained during a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AmplitudeMode {
    /// Amplitudes are ordinary fitted parameters.
    Direct,
    /// Amplitudes are solved by non-negative least squares at every
    /// evaluation and removed from the nonlinear search.
    Separable,
}

impl AmplitudeMode {
    pub fn fits_amplitudes(self) -> bool {
        matches!(self, AmplitudeMode::Direct)
    }
}

/// Line shape used for every line of every signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineShape {
    /// Pure absorptive Lorentzian.
    #[default]
    Absorptive,
    /// `real × absorptive + imag × dispersive`, for phase-mixed data.
    Mixed { real: f64, imag: f64 },
}

/// Which bounded derivative-free optimizer drives the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Trust-region refinement on a quadratic interpolation model.
    Local,
    /// Covariance-matrix-adaptation evolution strategy.
    Global,
}

impl OptimizerKind {
    pub fn display_name(self) -> &'static str {
        match self {
            OptimizerKind::Local => "trust-region",
            OptimizerKind::Global => "cma-es",
        }
    }
}

/// Start value and box for one physical parameter.
///
/// `lower == upper` pins the parameter at that value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBound {
    pub start: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ParamBound {
    pub fn new(start: f64, lower: f64, upper: f64) -> Self {
        Self {
            start,
            lower,
            upper,
        }
    }

    /// A parameter held at `value`.
    pub fn fixed(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// `start ± half_width`.
    pub fn around(start: f64, half_width: f64) -> Self {
        Self::new(start, start - half_width, start + half_width)
    }
}

/// Start/lower/upper vectors over the full (physical) parameter vector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub start: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl ParameterBounds {
    pub fn len(&self) -> usize {
        self.start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }

    pub fn push(&mut self, bound: ParamBound) {
        self.start.push(bound.start);
        self.lower.push(bound.lower);
        self.upper.push(bound.upper);
    }
}

impl FromIterator<ParamBound> for ParameterBounds {
    fn from_iter<I: IntoIterator<Item = ParamBound>>(iter: I) -> Self {
        let mut out = ParameterBounds::default();
        for b in iter {
            out.push(b);
        }
        out
    }
}

/// One decoded line of a generic multiplet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedLine {
    pub frequency: f64,
    pub amplitude: f64,
}

/// A fitted signal decoded back into physical quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FittedSignal {
    Coupled {
        center: f64,
        linewidth: f64,
        amplitude: f64,
        /// Multiplet label such as `dd` or `td`; `s` for a singlet.
        multiplicity: String,
        /// Refined couplings, ascending by `J`.
        couplings: Vec<CouplingItem>,
    },
    Generic {
        linewidth: f64,
        /// Lines ascending by frequency.
        lines: Vec<FittedLine>,
    },
}

impl FittedSignal {
    pub fn linewidth(&self) -> f64 {
        match self {
            FittedSignal::Coupled { linewidth, .. } | FittedSignal::Generic { linewidth, .. } => {
                *linewidth
            }
        }
    }
}

/// A full `mfit fit` run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub request_path: PathBuf,
    /// Spectrum CSV; when absent the request's start values are simulated.
    pub data_path: Option<PathBuf>,
    pub simulated_points: usize,
    pub simulated_noise: f64,
    pub optimizer: OptimizerKind,

    /// Evaluation budget; `None` keeps the optimizer's default.
    pub max_evaluations: Option<usize>,
    pub interpolation_points: Option<usize>,
    pub initial_radius: f64,
    pub final_radius: f64,

    pub population_multiplier: f64,
    pub sigma: f64,
    pub sigmas: Option<Vec<f64>>,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub seed: u64,

    pub show_residuals: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export_result: Option<PathBuf>,
    pub export_model: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_negative_multiplicity_is_generic() {
        let shape = SignalShape::from_legacy(&[-3]).unwrap();
        assert_eq!(shape, SignalShape::generic(3));
        assert_eq!(shape.line_count(), 3);
    }

    #[test]
    fn legacy_rejects_mixed_sentinel() {
        assert!(SignalShape::from_legacy(&[2, -3]).is_err());
        assert!(SignalShape::from_legacy(&[0]).is_err());
    }

    #[test]
    fn line_count_is_product_of_multiplicities() {
        assert_eq!(SignalShape::coupled(vec![3, 2]).line_count(), 6);
        assert_eq!(SignalShape::singlet().line_count(), 1);
    }

    #[test]
    fn validate_rejects_out_of_range_multiplicity() {
        assert!(SignalShape::coupled(vec![17]).validate().is_err());
        assert!(SignalShape::generic(0).validate().is_err());
        assert!(SignalShape::coupled(vec![2, 16]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_excessive_line_count() {
        let overflowing = SignalShape::coupled(vec![16; 17]);
        assert_eq!(overflowing.line_count(), usize::MAX);
        let err = overflowing.validate().unwrap_err();
        assert!(err.contains("more than"), "{err}");

        assert!(SignalShape::coupled(vec![16; 10]).validate().is_err());
        assert!(SignalShape::coupled(vec![16; 4]).validate().is_ok());
        assert!(SignalShape::generic(MAX_LINES + 1).validate().is_err());

        assert_eq!(checked_line_count([3, 2]), Some(6));
        assert_eq!(checked_line_count(Vec::new()), Some(1));
        assert_eq!(checked_line_count([16; 5]), None);
    }

    #[test]
    fn coupling_order_is_by_magnitude() {
        let mut items = vec![
            CouplingItem::plain(10.0, 2),
            CouplingItem::plain(5.0, 3),
            CouplingItem::plain(7.5, 2),
        ];
        items.sort_by(CouplingItem::cmp_coupling);
        let js: Vec<f64> = items.iter().map(|c| c.coupling).collect();
        assert_eq!(js, vec![5.0, 7.5, 10.0]);
    }
}
