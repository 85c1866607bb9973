//! Least squares solvers.
//!
//! Signal amplitudes enter the model linearly once line positions and widths
//! are fixed, so every objective evaluation in separable mode solves a small
//! problem of the form:
//!
//! ```text
//! minimize ‖A·a − y‖²   subject to a ≥ 0
//! ```
//!
//! Implementation choices:
//! - The unconstrained core uses SVD so tall design matrices (many samples,
//!   few lines) are solved robustly even when columns are nearly collinear
//!   (overlapping lines).
//! - Non-negativity is enforced with the Lawson–Hanson active-set method,
//!   which repeatedly calls the SVD core on the current passive columns.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Tolerance on the dual vector below which no column may enter the passive set.
const DUAL_TOL: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NnlsError {
    #[error("design matrix has {rows} rows but observation vector has {len}")]
    Shape { rows: usize, len: usize },
    #[error("non-finite value in least-squares input")]
    NonFinite,
    #[error("passive-set subproblem could not be solved")]
    Singular,
    #[error("no convergence after {0} iterations")]
    NotConverged(usize),
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Non-negative least squares (Lawson–Hanson).
///
/// `max_iterations` bounds the inner loop; `3 × columns` is the customary
/// choice and what [`solve_nnls_default`] uses.
pub fn solve_nnls(
    a: &DMatrix<f64>,
    y: &DVector<f64>,
    max_iterations: usize,
) -> Result<DVector<f64>, NnlsError> {
    let (m, n) = a.shape();
    if m != y.len() {
        return Err(NnlsError::Shape {
            rows: m,
            len: y.len(),
        });
    }
    if a.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(NnlsError::NonFinite);
    }

    let mut x = DVector::<f64>::zeros(n);
    if n == 0 {
        return Ok(x);
    }

    let mut passive = vec![false; n];
    let mut iterations = 0usize;

    loop {
        let w = a.transpose() * (y - a * &x);

        let entering = (0..n)
            .filter(|&j| !passive[j] && w[j] > DUAL_TOL)
            .max_by(|&i, &j| w[i].total_cmp(&w[j]));
        let Some(j) = entering else {
            break;
        };
        passive[j] = true;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                return Err(NnlsError::NotConverged(max_iterations));
            }

            let cols: Vec<usize> = (0..n).filter(|&k| passive[k]).collect();
            let sub = DMatrix::from_fn(m, cols.len(), |r, c| a[(r, cols[c])]);
            let z_sub = solve_least_squares(&sub, y).ok_or(NnlsError::Singular)?;

            let mut z = DVector::<f64>::zeros(n);
            for (c, &k) in cols.iter().enumerate() {
                z[k] = z_sub[c];
            }

            if cols.iter().all(|&k| z[k] > 0.0) {
                x = z;
                break;
            }

            // Step from x toward z until the first passive coefficient hits zero.
            let alpha = cols
                .iter()
                .filter(|&&k| z[k] <= 0.0)
                .map(|&k| x[k] / (x[k] - z[k]))
                .fold(f64::INFINITY, f64::min);
            x += (z - &x) * alpha;

            for &k in &cols {
                if x[k] <= DUAL_TOL {
                    x[k] = 0.0;
                    passive[k] = false;
                }
            }
        }
    }

    Ok(x)
}

pub fn solve_nnls_default(a: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>, NnlsError> {
    solve_nnls(a, y, 3 * a.ncols().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn nnls_matches_unconstrained_when_positive() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_nnls_default(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-9);
        assert!((beta[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn nnls_clamps_negative_coefficient() {
        // Unconstrained fit of y = 4 - 1.5x would give a negative slope.
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[4.0, 2.5, 1.0]);

        let beta = solve_nnls_default(&x, &y).unwrap();
        assert!(beta.iter().all(|&b| b >= 0.0));
        assert_eq!(beta[1], 0.0);
        // With the slope pinned at zero the intercept is the mean of y.
        assert!((beta[0] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn nnls_rejects_shape_mismatch() {
        let x = DMatrix::<f64>::zeros(3, 2);
        let y = DVector::<f64>::zeros(2);
        assert_eq!(
            solve_nnls_default(&x, &y),
            Err(NnlsError::Shape { rows: 3, len: 2 })
        );
    }

    #[test]
    fn nnls_all_zero_target_gives_zero() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let y = DVector::<f64>::zeros(2);
        let beta = solve_nnls_default(&x, &y).unwrap();
        assert!(beta.iter().all(|&b| b == 0.0));
    }
}
