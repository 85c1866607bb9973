//! Lorentzian line shapes.
//!
//! With half-width `b = lw / 2` and offset `d = x - f`:
//!
//! - absorptive: `A(x) = b² / (b² + d²)` (peak height 1 at `x = f`)
//! - dispersive: `D(x) = -b·d / (b² + d²)`
//!
//! The mixed shape is `real·A + imag·D`. All shapes are finite for any finite
//! input as long as `lw > 0`; a zero width degenerates to a unit spike at `f`.

use crate::domain::LineShape;

/// Absorptive Lorentzian of full width `lw`, centered at `freq`, height 1.
pub fn lorentzian(x: f64, freq: f64, lw: f64) -> f64 {
    let b = 0.5 * lw;
    let d = x - freq;
    let denom = b * b + d * d;
    if denom == 0.0 {
        return 1.0;
    }
    b * b / denom
}

/// Dispersive Lorentzian companion of [`lorentzian`].
pub fn dispersive(x: f64, freq: f64, lw: f64) -> f64 {
    let b = 0.5 * lw;
    let d = x - freq;
    let denom = b * b + d * d;
    if denom == 0.0 {
        return 0.0;
    }
    -b * d / denom
}

impl LineShape {
    /// Evaluate one unit-amplitude line at `x`.
    pub fn value(&self, x: f64, freq: f64, lw: f64) -> f64 {
        match *self {
            LineShape::Absorptive => lorentzian(x, freq, lw),
            LineShape::Mixed { real, imag } => {
                real * lorentzian(x, freq, lw) + imag * dispersive(x, freq, lw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_height_and_half_width() {
        assert!((lorentzian(10.0, 10.0, 2.0) - 1.0).abs() < 1e-12);
        // At x = f ± lw/2 the absorptive shape is exactly half height.
        assert!((lorentzian(11.0, 10.0, 2.0) - 0.5).abs() < 1e-12);
        assert!((lorentzian(9.0, 10.0, 2.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn dispersive_is_odd_about_center() {
        let left = dispersive(8.5, 10.0, 3.0);
        let right = dispersive(11.5, 10.0, 3.0);
        assert!((left + right).abs() < 1e-12);
        assert_eq!(dispersive(10.0, 10.0, 3.0), 0.0);
    }

    #[test]
    fn mixed_reduces_to_absorptive() {
        let mixed = LineShape::Mixed {
            real: 1.0,
            imag: 0.0,
        };
        for &x in &[0.0, 4.5, 10.0, 17.0] {
            let a = LineShape::Absorptive.value(x, 10.0, 2.0);
            assert!((mixed.value(x, 10.0, 2.0) - a).abs() < 1e-15);
        }
    }

    #[test]
    fn zero_width_is_finite() {
        assert_eq!(lorentzian(3.0, 3.0, 0.0), 1.0);
        assert_eq!(lorentzian(4.0, 3.0, 0.0), 0.0);
        assert!(dispersive(3.0, 3.0, 0.0).is_finite());
    }
}
