//! Coupling patterns: an ordered coupling set with its materialized lines.

use serde::Serialize;

use crate::domain::{CouplingItem, MAX_LINES, MAX_MULTIPLICITY, checked_line_count};
use crate::error::FitError;
use crate::models::splitting::{LineSet, sort_couplings, split_lines};

/// Smallest coupling `adjust_coupling` will produce, and the minimum gap it
/// keeps to neighbouring couplings.
pub const MIN_COUPLING: f64 = 0.1;

/// An ordered set of couplings plus an overall intensity.
///
/// Line offsets and intensities are derived once at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouplingPattern {
    items: Vec<CouplingItem>,
    intensity: f64,
    lines: LineSetView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LineSetView {
    frequencies: Vec<f64>,
    intensities: Vec<f64>,
}

impl CouplingPattern {
    /// Build a pattern; `items` are sorted ascending by coupling.
    pub fn new(mut items: Vec<CouplingItem>, intensity: f64) -> Result<Self, FitError> {
        for (i, item) in items.iter().enumerate() {
            if !(1..=MAX_MULTIPLICITY).contains(&item.multiplicity) {
                return Err(FitError::InvalidPattern(format!(
                    "coupling {i} has multiplicity {}; expected 1..={MAX_MULTIPLICITY}",
                    item.multiplicity
                )));
            }
            if !item.coupling.is_finite() || !item.antiphase.is_finite() {
                return Err(FitError::InvalidPattern(format!(
                    "coupling {i} has a non-finite value"
                )));
            }
        }
        if checked_line_count(items.iter().map(|item| item.multiplicity)).is_none() {
            return Err(FitError::InvalidPattern(format!(
                "{} couplings expand to more than {MAX_LINES} lines",
                items.len()
            )));
        }
        sort_couplings(&mut items);

        let mut set = LineSet::singlet();
        split_lines(&items, &mut set);
        let LineSet {
            frequencies,
            amplitudes,
        } = set;
        let intensities = amplitudes.into_iter().map(|a| a * intensity).collect();

        Ok(Self {
            items,
            intensity,
            lines: LineSetView {
                frequencies,
                intensities,
            },
        })
    }

    /// Pattern from parallel coupling / multiplicity / anti-phase slices.
    pub fn from_values(
        values: &[f64],
        multiplicities: &[u32],
        antiphase: &[f64],
        intensity: f64,
    ) -> Result<Self, FitError> {
        if values.len() != multiplicities.len() || values.len() != antiphase.len() {
            return Err(FitError::InvalidPattern(format!(
                "{} couplings, {} multiplicities, {} anti-phase factors",
                values.len(),
                multiplicities.len(),
                antiphase.len()
            )));
        }
        let items = values
            .iter()
            .zip(multiplicities)
            .zip(antiphase)
            .map(|((&j, &n), &s)| CouplingItem::new(j, s, n))
            .collect();
        Self::new(items, intensity)
    }

    pub fn items(&self) -> &[CouplingItem] {
        &self.items
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Multiplet label, one letter per coupling (`s` for a singlet).
    pub fn multiplicity(&self) -> String {
        if self.items.is_empty() {
            return "s".to_string();
        }
        self.items.iter().map(CouplingItem::multiplicity_letter).collect()
    }

    pub fn coupling_at(&self, i: usize) -> f64 {
        self.items.get(i).map_or(0.0, |c| c.coupling)
    }

    pub fn multiplicity_at(&self, i: usize) -> u32 {
        self.items.get(i).map_or(0, |c| c.multiplicity)
    }

    pub fn antiphase_at(&self, i: usize) -> f64 {
        self.items.get(i).map_or(0.0, |c| c.antiphase)
    }

    /// Intensity of derived line `i` (0 out of range).
    pub fn intensity_at(&self, i: usize) -> f64 {
        self.lines.intensities.get(i).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> Vec<f64> {
        self.items.iter().map(|c| c.coupling).collect()
    }

    pub fn antiphase_factors(&self) -> Vec<f64> {
        self.items.iter().map(|c| c.antiphase).collect()
    }

    pub fn multiplicities(&self) -> Vec<u32> {
        self.items.iter().map(|c| c.multiplicity).collect()
    }

    pub fn line_count(&self) -> usize {
        self.lines.frequencies.len()
    }

    /// Line offsets relative to the multiplet center, in cascade order.
    pub fn frequencies(&self) -> &[f64] {
        &self.lines.frequencies
    }

    /// Line intensities (cascade amplitude × pattern intensity).
    pub fn intensities(&self) -> &[f64] {
        &self.lines.intensities
    }

    /// `"J n-1 J n-1 ..."`; a lone doublet is just `"J"`.
    pub fn couplings_as_string(&self) -> String {
        if let [only] = self.items.as_slice() {
            if only.multiplicity == 2 {
                return only.coupling.to_string();
            }
        }
        self.items
            .iter()
            .map(|c| format!("{} {}", c.coupling, c.multiplicity.saturating_sub(1)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Couplings with two decimals, space separated.
    pub fn couplings_as_simple_string(&self) -> String {
        self.items
            .iter()
            .map(|c| format!("{:.2}", c.coupling))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Copy with coupling `i` moved to `value`.
    ///
    /// The new value is at least [`MIN_COUPLING`] and stays at least
    /// `MIN_COUPLING` away from its neighbours so the ascending order is kept.
    /// An out-of-range index returns an unchanged copy.
    pub fn adjust_coupling(&self, i: usize, value: f64) -> Result<Self, FitError> {
        if i >= self.items.len() {
            return Ok(self.clone());
        }
        let mut v = value.max(MIN_COUPLING);
        if i > 0 {
            v = v.max(self.items[i - 1].coupling + MIN_COUPLING);
        }
        if i + 1 < self.items.len() {
            v = v.min(self.items[i + 1].coupling - MIN_COUPLING);
        }
        let mut items = self.items.clone();
        items[i] = CouplingItem::new(v, items[i].antiphase, items[i].multiplicity);
        Self::new(items, self.intensity)
    }
}
