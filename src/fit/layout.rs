//! Flat parameter vector layout.
//!
//! Every signal owns one contiguous slice of the parameter vector:
//!
//! ```text
//! coupled:  lw, [amp], center, J1, ap1, J2, ap2, ...
//! generic:  lw, (amp, freq) × m        (direct amplitudes)
//!           lw, freq × m               (separable amplitudes)
//! ```
//!
//! `[amp]` is only present when amplitudes are fitted directly. Amplitude
//! *columns* (one per coupled signal, one per generic line) index the linear
//! sub-problem in separable mode and the amplitude vector reported in both.

use tracing::debug;

use crate::domain::{AmplitudeMode, SignalShape};
use crate::error::{FitError, FitResult};

/// Placement of one signal inside the parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSlot {
    pub shape: SignalShape,
    /// Index of the signal's first (linewidth) parameter.
    pub start: usize,
    /// Number of parameters owned by the signal.
    pub len: usize,
    /// First amplitude column owned by the signal.
    pub amplitude_column: usize,
    direct: bool,
}

impl SignalSlot {
    fn param_count(shape: &SignalShape, mode: AmplitudeMode) -> usize {
        let direct = mode.fits_amplitudes();
        match shape {
            SignalShape::Coupled { multiplicities } => {
                1 + usize::from(direct) + 1 + 2 * multiplicities.len()
            }
            SignalShape::Generic { lines } => 1 + if direct { 2 * lines } else { *lines },
        }
    }

    pub fn linewidth_index(&self) -> usize {
        self.start
    }

    /// Amplitude parameter of a coupled signal in direct mode.
    pub fn amplitude_index(&self) -> Option<usize> {
        match self.shape {
            SignalShape::Coupled { .. } if self.direct => Some(self.start + 1),
            _ => None,
        }
    }

    pub fn center_index(&self) -> Option<usize> {
        match self.shape {
            SignalShape::Coupled { .. } => Some(self.start + 1 + usize::from(self.direct)),
            SignalShape::Generic { .. } => None,
        }
    }

    /// `(J, antiphase)` indices of coupling `k`.
    pub fn coupling_indices(&self, k: usize) -> Option<(usize, usize)> {
        match &self.shape {
            SignalShape::Coupled { multiplicities } if k < multiplicities.len() => {
                let first = self.start + 2 + usize::from(self.direct) + 2 * k;
                Some((first, first + 1))
            }
            _ => None,
        }
    }

    /// Amplitude parameter of generic line `l` in direct mode.
    pub fn line_amplitude_index(&self, l: usize) -> Option<usize> {
        match self.shape {
            SignalShape::Generic { lines } if self.direct && l < lines => {
                Some(self.start + 1 + 2 * l)
            }
            _ => None,
        }
    }

    pub fn line_frequency_index(&self, l: usize) -> Option<usize> {
        match self.shape {
            SignalShape::Generic { lines } if l < lines => Some(if self.direct {
                self.start + 2 + 2 * l
            } else {
                self.start + 1 + l
            }),
            _ => None,
        }
    }

    /// Number of amplitude columns this signal contributes.
    pub fn amplitude_columns(&self) -> usize {
        match self.shape {
            SignalShape::Coupled { .. } => 1,
            SignalShape::Generic { lines } => lines,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Layout of all signals of one fitting session. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLayout {
    slots: Vec<SignalSlot>,
    total: usize,
    amplitude_columns: usize,
    mode: AmplitudeMode,
}

impl ParameterLayout {
    pub fn new(signals: &[SignalShape], mode: AmplitudeMode) -> FitResult<Self> {
        if signals.is_empty() {
            return Err(FitError::InvalidSignal {
                index: 0,
                reason: "a fit needs at least one signal".to_string(),
            });
        }

        let mut slots = Vec::with_capacity(signals.len());
        let mut start = 0;
        let mut column = 0;
        for (index, shape) in signals.iter().enumerate() {
            shape
                .validate()
                .map_err(|reason| FitError::InvalidSignal { index, reason })?;

            let len = SignalSlot::param_count(shape, mode);
            let slot = SignalSlot {
                shape: shape.clone(),
                start,
                len,
                amplitude_column: column,
                direct: mode.fits_amplitudes(),
            };
            start += len;
            column += slot.amplitude_columns();
            slots.push(slot);
        }

        debug!(
            signals = slots.len(),
            parameters = start,
            amplitude_columns = column,
            ?mode,
            "parameter layout built"
        );

        Ok(Self {
            slots,
            total: start,
            amplitude_columns: column,
            mode,
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn slots(&self) -> &[SignalSlot] {
        &self.slots
    }

    pub fn amplitude_columns(&self) -> usize {
        self.amplitude_columns
    }

    pub fn mode(&self) -> AmplitudeMode {
        self.mode
    }

    /// Fail unless `params` matches the layout length.
    pub fn check_len(&self, what: &'static str, params: &[f64]) -> FitResult<()> {
        if params.len() != self.total {
            return Err(FitError::DimensionMismatch {
                what,
                expected: self.total,
                found: params.len(),
            });
        }
        Ok(())
    }

    /// Human-readable name for every parameter, in layout order.
    ///
    /// Signals are `s0, s1, ...`; couplings and generic lines are numbered from 1.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.total);
        for (i, slot) in self.slots.iter().enumerate() {
            names.push(format!("s{i}.lw"));
            match &slot.shape {
                SignalShape::Coupled { multiplicities } => {
                    if slot.direct {
                        names.push(format!("s{i}.amp"));
                    }
                    names.push(format!("s{i}.center"));
                    for k in 1..=multiplicities.len() {
                        names.push(format!("s{i}.j{k}"));
                        names.push(format!("s{i}.ap{k}"));
                    }
                }
                SignalShape::Generic { lines } => {
                    for l in 1..=*lines {
                        if slot.direct {
                            names.push(format!("s{i}.l{l}.amp"));
                        }
                        names.push(format!("s{i}.l{l}.freq"));
                    }
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes() -> Vec<SignalShape> {
        vec![SignalShape::coupled(vec![2, 3]), SignalShape::generic(2)]
    }

    #[test]
    fn separable_layout_counts() {
        let layout = ParameterLayout::new(&shapes(), AmplitudeMode::Separable).unwrap();
        // coupled: lw, center, 2×(J, ap) = 6; generic: lw + 2 freqs = 3
        assert_eq!(layout.total(), 9);
        assert_eq!(layout.amplitude_columns(), 3);

        let slots = layout.slots();
        assert_eq!((slots[0].start, slots[0].len), (0, 6));
        assert_eq!((slots[1].start, slots[1].len), (6, 3));
        assert_eq!(slots[1].amplitude_column, 1);
        assert_eq!(slots[0].amplitude_index(), None);
        assert_eq!(slots[0].center_index(), Some(1));
        assert_eq!(slots[0].coupling_indices(1), Some((4, 5)));
        assert_eq!(slots[1].line_frequency_index(1), Some(8));
    }

    #[test]
    fn direct_layout_adds_amplitudes() {
        let layout = ParameterLayout::new(&shapes(), AmplitudeMode::Direct).unwrap();
        assert_eq!(layout.total(), 7 + 5);

        let slots = layout.slots();
        assert_eq!(slots[0].amplitude_index(), Some(1));
        assert_eq!(slots[0].center_index(), Some(2));
        assert_eq!(slots[0].coupling_indices(0), Some((3, 4)));
        assert_eq!(slots[1].line_amplitude_index(0), Some(8));
        assert_eq!(slots[1].line_frequency_index(0), Some(9));
        assert_eq!(slots[1].line_frequency_index(1), Some(11));
    }

    #[test]
    fn slots_are_contiguous() {
        let layout = ParameterLayout::new(&shapes(), AmplitudeMode::Direct).unwrap();
        let mut next = 0;
        for slot in layout.slots() {
            assert_eq!(slot.start, next);
            next = slot.end();
        }
        assert_eq!(next, layout.total());
    }

    #[test]
    fn names_follow_layout() {
        let layout = ParameterLayout::new(&shapes(), AmplitudeMode::Separable).unwrap();
        let names = layout.parameter_names();
        assert_eq!(names.len(), layout.total());
        assert_eq!(
            names,
            vec![
                "s0.lw", "s0.center", "s0.j1", "s0.ap1", "s0.j2", "s0.ap2", "s1.lw",
                "s1.l1.freq", "s1.l2.freq"
            ]
        );
    }

    #[test]
    fn inconsistent_signal_fails_fast() {
        let err = ParameterLayout::new(
            &[SignalShape::singlet(), SignalShape::generic(0)],
            AmplitudeMode::Direct,
        )
        .unwrap_err();
        assert!(matches!(err, FitError::InvalidSignal { index: 1, .. }));
        assert!(ParameterLayout::new(&[], AmplitudeMode::Direct).is_err());
    }

    #[test]
    fn oversized_cascade_is_rejected() {
        let shapes = [SignalShape::coupled(vec![16; 17])];
        let err = ParameterLayout::new(&shapes, AmplitudeMode::Separable).unwrap_err();
        assert!(matches!(err, FitError::InvalidSignal { index: 0, .. }), "{err}");
    }

    #[test]
    fn length_check_reports_mismatch() {
        let layout =
            ParameterLayout::new(&[SignalShape::singlet()], AmplitudeMode::Direct).unwrap();
        assert!(layout.check_len("parameters", &[1.0, 1.0, 1.0]).is_ok());
        assert_eq!(
            layout.check_len("parameters", &[1.0]),
            Err(FitError::DimensionMismatch {
                what: "parameters",
                expected: 3,
                found: 1
            })
        );
    }
}
