//! Model evaluation for one set of signals against one spectrum.
//!
//! Given a physical parameter vector the engine:
//! - rebuilds every signal's line set (cascade for coupled signals, explicit
//!   lines for generic ones)
//! - forms the model either directly from fitted amplitudes or from a
//!   non-negative least-squares solve over the design matrix
//! - reports the RMS residual against the observed samples
//!
//! All buffers (design matrix, model vector, line sets, coupling scratch) are
//! sized once and overwritten on every evaluation.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{AmplitudeMode, CouplingItem, FittedLine, FittedSignal, LineShape, SignalShape};
use crate::error::{FitError, FitResult};
use crate::fit::layout::{ParameterLayout, SignalSlot};
use crate::math::solve_nnls_default;
use crate::models::{CouplingPattern, LineSet, sort_couplings, split_lines};

/// Outcome of one objective evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub residual: f64,
    /// One entry per amplitude column: solved in separable mode, read from the
    /// parameters in direct mode.
    pub amplitudes: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FitEngine {
    layout: ParameterLayout,
    line_shape: LineShape,
    x: Vec<f64>,
    y: DVector<f64>,
    design: DMatrix<f64>,
    model: DVector<f64>,
    lines: Vec<LineSet>,
    items: Vec<CouplingItem>,
}

impl FitEngine {
    pub fn new(
        signals: &[SignalShape],
        mode: AmplitudeMode,
        line_shape: LineShape,
        x: Vec<f64>,
        y: Vec<f64>,
    ) -> FitResult<Self> {
        if x.len() != y.len() {
            return Err(FitError::DimensionMismatch {
                what: "observed intensities",
                expected: x.len(),
                found: y.len(),
            });
        }
        if x.is_empty() {
            return Err(FitError::InvalidData("no samples to fit".to_string()));
        }
        if let Some(i) = x.iter().chain(&y).position(|v| !v.is_finite()) {
            return Err(FitError::InvalidData(format!(
                "non-finite sample value at position {}",
                i % x.len()
            )));
        }

        let layout = ParameterLayout::new(signals, mode)?;
        let n = x.len();
        let lines = layout
            .slots()
            .iter()
            .map(|slot| {
                let count = slot.shape.line_count();
                LineSet {
                    frequencies: Vec::with_capacity(count),
                    amplitudes: Vec::with_capacity(count),
                }
            })
            .collect();
        let design = DMatrix::zeros(n, layout.amplitude_columns());

        Ok(Self {
            layout,
            line_shape,
            x,
            y: DVector::from_vec(y),
            design,
            model: DVector::zeros(n),
            lines,
            items: Vec::new(),
        })
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        self.y.as_slice()
    }

    pub fn line_shape(&self) -> LineShape {
        self.line_shape
    }

    /// Evaluate `params` (physical units) and return the RMS residual.
    pub fn evaluate(&mut self, params: &[f64]) -> FitResult<Evaluation> {
        self.layout.check_len("parameters", params)?;
        self.refresh_lines(params);

        let amplitudes = match self.layout.mode() {
            AmplitudeMode::Separable => self.solve_separable(params),
            AmplitudeMode::Direct => self.fill_direct(params),
        };

        let n = self.x.len();
        let sse: f64 = self
            .y
            .iter()
            .zip(self.model.iter())
            .map(|(obs, calc)| (obs - calc) * (obs - calc))
            .sum();
        let residual = (sse / n as f64).sqrt();

        Ok(Evaluation {
            residual,
            amplitudes,
        })
    }

    /// Modeled intensity at every sample for `params`.
    pub fn model_values(&mut self, params: &[f64]) -> FitResult<Vec<f64>> {
        self.evaluate(params)?;
        Ok(self.model.as_slice().to_vec())
    }

    /// Decode a parameter vector and its amplitude columns into signals.
    pub fn decode(&self, params: &[f64], amplitudes: &[f64]) -> FitResult<Vec<FittedSignal>> {
        self.layout.check_len("parameters", params)?;
        if amplitudes.len() != self.layout.amplitude_columns() {
            return Err(FitError::DimensionMismatch {
                what: "amplitudes",
                expected: self.layout.amplitude_columns(),
                found: amplitudes.len(),
            });
        }

        let mut out = Vec::with_capacity(self.layout.slots().len());
        for slot in self.layout.slots() {
            let linewidth = params[slot.linewidth_index()].abs();
            match &slot.shape {
                SignalShape::Coupled { multiplicities } => {
                    let amplitude = amplitudes[slot.amplitude_column];
                    let center = slot.center_index().map_or(0.0, |i| params[i]);
                    let items = coupling_items(slot, multiplicities, params).collect();
                    let pattern = CouplingPattern::new(items, amplitude)?;
                    out.push(FittedSignal::Coupled {
                        center,
                        linewidth,
                        amplitude,
                        multiplicity: pattern.multiplicity(),
                        couplings: pattern.items().to_vec(),
                    });
                }
                SignalShape::Generic { lines } => {
                    let mut fitted: Vec<FittedLine> = (0..*lines)
                        .map(|l| FittedLine {
                            frequency: slot.line_frequency_index(l).map_or(0.0, |i| params[i]),
                            amplitude: amplitudes[slot.amplitude_column + l],
                        })
                        .collect();
                    fitted.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
                    out.push(FittedSignal::Generic {
                        linewidth,
                        lines: fitted,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Rebuild every signal's line offsets and relative amplitudes.
    fn refresh_lines(&mut self, params: &[f64]) {
        let direct = self.layout.mode().fits_amplitudes();
        for (slot, lines) in self.layout.slots().iter().zip(self.lines.iter_mut()) {
            match &slot.shape {
                SignalShape::Coupled { multiplicities } => {
                    self.items.clear();
                    self.items.extend(coupling_items(slot, multiplicities, params));
                    sort_couplings(&mut self.items);

                    lines.reset_singlet();
                    split_lines(&self.items, lines);
                    if let Some(c) = slot.center_index() {
                        lines.shift(params[c]);
                    }
                    if let Some(a) = slot.amplitude_index() {
                        let scale = params[a];
                        for amp in &mut lines.amplitudes {
                            *amp *= scale;
                        }
                    }
                }
                SignalShape::Generic { lines: count } => {
                    lines.frequencies.clear();
                    lines.amplitudes.clear();
                    for l in 0..*count {
                        let f = slot.line_frequency_index(l).map_or(0.0, |i| params[i]);
                        let a = match slot.line_amplitude_index(l) {
                            Some(i) if direct => params[i],
                            _ => 1.0,
                        };
                        lines.frequencies.push(f);
                        lines.amplitudes.push(a);
                    }
                }
            }
        }
    }

    /// Model intensities for `params` with the given amplitude columns.
    ///
    /// In direct mode the amplitudes come from `params` and `amplitudes` is
    /// ignored.
    pub fn synthesize(&mut self, params: &[f64], amplitudes: &[f64]) -> FitResult<Vec<f64>> {
        self.layout.check_len("parameters", params)?;
        self.refresh_lines(params);
        match self.layout.mode() {
            AmplitudeMode::Separable => {
                if amplitudes.len() != self.layout.amplitude_columns() {
                    return Err(FitError::DimensionMismatch {
                        what: "amplitudes",
                        expected: self.layout.amplitude_columns(),
                        found: amplitudes.len(),
                    });
                }
                self.fill_design(params);
                let a = DVector::from_column_slice(amplitudes);
                self.model.gemv(1.0, &self.design, &a, 0.0);
            }
            AmplitudeMode::Direct => {
                self.fill_direct(params);
            }
        }
        Ok(self.model.as_slice().to_vec())
    }

    fn solve_separable(&mut self, params: &[f64]) -> Vec<f64> {
        self.fill_design(params);
        let amplitudes = match solve_nnls_default(&self.design, &self.y) {
            Ok(a) => a,
            Err(err) => {
                debug!(%err, "amplitude solve failed; using zero amplitudes");
                DVector::zeros(self.design.ncols())
            }
        };
        self.model.gemv(1.0, &self.design, &amplitudes, 0.0);
        amplitudes.as_slice().to_vec()
    }

    /// One design column per coupled signal and per generic line.
    fn fill_design(&mut self, params: &[f64]) {
        let shape = self.line_shape;
        for (slot, lines) in self.layout.slots().iter().zip(&self.lines) {
            let lw = params[slot.linewidth_index()];
            match slot.shape {
                SignalShape::Coupled { .. } => {
                    let col = slot.amplitude_column;
                    for (r, &x) in self.x.iter().enumerate() {
                        self.design[(r, col)] = superpose(shape, x, lw, lines.iter());
                    }
                }
                SignalShape::Generic { .. } => {
                    for (l, (f, a)) in lines.iter().enumerate() {
                        let col = slot.amplitude_column + l;
                        for (r, &x) in self.x.iter().enumerate() {
                            self.design[(r, col)] =
                                superpose(shape, x, lw, std::iter::once((f, a)));
                        }
                    }
                }
            }
        }
    }

    fn fill_direct(&mut self, params: &[f64]) -> Vec<f64> {
        let shape = self.line_shape;
        self.model.fill(0.0);
        for (slot, lines) in self.layout.slots().iter().zip(&self.lines) {
            let lw = params[slot.linewidth_index()];
            for (r, &x) in self.x.iter().enumerate() {
                self.model[r] += superpose(shape, x, lw, lines.iter());
            }
        }

        let mut amplitudes = Vec::with_capacity(self.layout.amplitude_columns());
        for slot in self.layout.slots() {
            match slot.shape {
                SignalShape::Coupled { .. } => {
                    amplitudes.push(slot.amplitude_index().map_or(0.0, |i| params[i]));
                }
                SignalShape::Generic { lines } => {
                    amplitudes.extend(
                        (0..lines).map(|l| slot.line_amplitude_index(l).map_or(0.0, |i| params[i])),
                    );
                }
            }
        }
        amplitudes
    }
}

/// Coupling items of a coupled slot, in parameter order.
fn coupling_items<'a>(
    slot: &'a SignalSlot,
    multiplicities: &'a [u32],
    params: &'a [f64],
) -> impl Iterator<Item = CouplingItem> + 'a {
    multiplicities.iter().enumerate().filter_map(move |(k, &n)| {
        slot.coupling_indices(k)
            .map(|(j, s)| CouplingItem::new(params[j], params[s], n))
    })
}

/// Sum of `|a| × shape(x)` over lines.
///
/// A negative line amplitude flips the sign of its line shape, so every line
/// contributes with the magnitude of its amplitude.
fn superpose(
    shape: LineShape,
    x: f64,
    lw: f64,
    lines: impl Iterator<Item = (f64, f64)>,
) -> f64 {
    lines
        .map(|(f, a)| {
            let v = shape.value(x, f, lw);
            if a < 0.0 { -v * a } else { v * a }
        })
        .sum()
}
