//! Mapping between physical parameters and the optimizer's `[0, 100]` box.
//!
//! `scaled = 100 · (p − lower) / (upper − lower)`
//!
//! Parameters with `lower == upper` are fixed: they never reach the optimizer
//! and unscale to their bound. Values outside `[lower, upper]` pass through the
//! affine map unchanged; optimizers keep scaled points inside the box.

use crate::domain::ParameterBounds;
use crate::error::{FitError, FitResult};

pub const SCALE_MAX: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterScaler {
    bounds: ParameterBounds,
    free: Vec<usize>,
}

impl ParameterScaler {
    /// Validate `bounds` and build the scaler.
    pub fn new(bounds: ParameterBounds) -> FitResult<Self> {
        let n = bounds.start.len();
        let lens = [("lower bounds", bounds.lower.len()), ("upper bounds", bounds.upper.len())];
        for (what, len) in lens {
            if len != n {
                return Err(FitError::DimensionMismatch {
                    what,
                    expected: n,
                    found: len,
                });
            }
        }

        let mut free = Vec::with_capacity(n);
        for i in 0..n {
            let (s, lo, up) = (bounds.start[i], bounds.lower[i], bounds.upper[i]);
            if !(s.is_finite() && lo.is_finite() && up.is_finite()) {
                return Err(FitError::InvalidBounds {
                    index: i,
                    reason: "start and bounds must be finite".to_string(),
                });
            }
            if lo > up {
                return Err(FitError::InvalidBounds {
                    index: i,
                    reason: format!("lower bound {lo} exceeds upper bound {up}"),
                });
            }
            if s < lo || s > up {
                return Err(FitError::InvalidBounds {
                    index: i,
                    reason: format!("start {s} outside [{lo}, {up}]"),
                });
            }
            if up > lo {
                free.push(i);
            }
        }

        Ok(Self { bounds, free })
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    /// Number of physical parameters.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Number of optimizer dimensions.
    pub fn free_dims(&self) -> usize {
        self.free.len()
    }

    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    pub fn is_fixed(&self, i: usize) -> bool {
        self.bounds.lower[i] == self.bounds.upper[i]
    }

    pub fn scale_value(&self, i: usize, physical: f64) -> f64 {
        let (lo, up) = (self.bounds.lower[i], self.bounds.upper[i]);
        SCALE_MAX * (physical - lo) / (up - lo)
    }

    pub fn unscale_value(&self, i: usize, scaled: f64) -> f64 {
        let (lo, up) = (self.bounds.lower[i], self.bounds.upper[i]);
        lo + scaled / SCALE_MAX * (up - lo)
    }

    /// Scale a full physical vector down to the free dimensions.
    pub fn scale(&self, physical: &[f64]) -> FitResult<Vec<f64>> {
        self.check_physical(physical)?;
        Ok(self
            .free
            .iter()
            .map(|&i| self.scale_value(i, physical[i]))
            .collect())
    }

    /// Expand free scaled coordinates into a full physical vector.
    pub fn unscale_into(&self, scaled: &[f64], physical: &mut Vec<f64>) -> FitResult<()> {
        if scaled.len() != self.free.len() {
            return Err(FitError::DimensionMismatch {
                what: "scaled point",
                expected: self.free.len(),
                found: scaled.len(),
            });
        }
        physical.clear();
        physical.extend_from_slice(&self.bounds.lower);
        for (&i, &z) in self.free.iter().zip(scaled) {
            physical[i] = self.unscale_value(i, z);
        }
        Ok(())
    }

    pub fn unscale(&self, scaled: &[f64]) -> FitResult<Vec<f64>> {
        let mut out = Vec::with_capacity(self.len());
        self.unscale_into(scaled, &mut out)?;
        Ok(out)
    }

    /// The start vector in scaled coordinates.
    pub fn scaled_start(&self) -> Vec<f64> {
        self.free
            .iter()
            .map(|&i| self.scale_value(i, self.bounds.start[i]))
            .collect()
    }

    fn check_physical(&self, physical: &[f64]) -> FitResult<()> {
        if physical.len() != self.len() {
            return Err(FitError::DimensionMismatch {
                what: "physical parameters",
                expected: self.len(),
                found: physical.len(),
            });
        }
        Ok(())
    }
}
