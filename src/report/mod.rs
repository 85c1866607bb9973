//! Reporting utilities: residuals, rankings, and formatted terminal output.

pub mod format;

pub use format::*;

use crate::error::AppError;

/// Observed vs modeled intensity at one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualRow {
    pub x: f64,
    pub observed: f64,
    pub model: f64,
    pub residual: f64,
}

/// Samples with the largest residuals on each side.
#[derive(Debug, Clone, Default)]
pub struct ResidualRankings {
    /// Observed above model (a missing or under-sized line).
    pub over: Vec<ResidualRow>,
    /// Observed below model.
    pub under: Vec<ResidualRow>,
}

/// Pair each sample with its modeled value and residual.
pub fn compute_residuals(
    x: &[f64],
    y: &[f64],
    model: &[f64],
) -> Result<Vec<ResidualRow>, AppError> {
    if x.len() != y.len() || x.len() != model.len() {
        return Err(AppError::new(
            3,
            format!(
                "Residual inputs differ in length: x={}, y={}, model={}",
                x.len(),
                y.len(),
                model.len()
            ),
        ));
    }

    let mut out = Vec::with_capacity(x.len());
    for ((&x, &observed), &model) in x.iter().zip(y).zip(model) {
        if !model.is_finite() {
            return Err(AppError::new(4, "Non-finite model value during residual computation."));
        }
        out.push(ResidualRow {
            x,
            observed,
            model,
            residual: observed - model,
        });
    }
    Ok(out)
}

/// Top-`n` samples by positive and by negative residual.
pub fn rank_residuals(rows: &[ResidualRow], top_n: usize) -> ResidualRankings {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| b.residual.total_cmp(&a.residual));
    let over = sorted
        .iter()
        .take_while(|r| r.residual > 0.0)
        .take(top_n)
        .copied()
        .collect();

    sorted.reverse();
    let under = sorted
        .iter()
        .take_while(|r| r.residual < 0.0)
        .take(top_n)
        .copied()
        .collect();

    ResidualRankings { over, under }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_residuals_basic() {
        let rows = compute_residuals(&[0.0, 1.0], &[1.0, 2.0], &[1.0, 1.5]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].residual, 0.0);
        assert!((rows[1].residual - 0.5).abs() < 1e-12);
    }

    #[test]
    fn compute_residuals_rejects_mismatch_and_nan() {
        assert_eq!(compute_residuals(&[0.0], &[1.0, 2.0], &[1.0]).unwrap_err().exit_code(), 3);
        assert_eq!(compute_residuals(&[0.0], &[1.0], &[f64::NAN]).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn rank_residuals_splits_sides() {
        let rows = compute_residuals(
            &[0.0, 1.0, 2.0, 3.0],
            &[1.0, 3.0, 0.0, 1.0],
            &[1.0, 1.0, 1.0, 0.5],
        )
        .unwrap();

        let rankings = rank_residuals(&rows, 1);
        assert_eq!(rankings.over.len(), 1);
        assert_eq!(rankings.over[0].x, 1.0);
        assert_eq!(rankings.under.len(), 1);
        assert_eq!(rankings.under[0].x, 2.0);

        let all = rank_residuals(&rows, 10);
        assert_eq!(all.over.len(), 2);
        assert_eq!(all.under.len(), 1);
    }
}
