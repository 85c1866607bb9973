//! Local refinement: a derivative-free trust-region method.
//!
//! Each iteration builds a quadratic model of the objective around the current
//! point from interpolation samples:
//!
//! - two samples per coordinate give the gradient and diagonal curvature
//! - with fewer than `2d+1` points, trailing coordinates get a single sample
//!   and a linear model
//! - each extra interpolation point adds one mixed curvature term `H_ij`
//!
//! The model is minimized over the box intersected with the trust region by
//! projected gradient steps. The radius grows after good steps that reach the
//! trust-region boundary and shrinks after poor ones; the run converges once
//! the radius drops below `final_radius`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FitError, FitResult};
use crate::fit::optimizer::{BoundedOptimizer, CountedObjective, OptimOutcome, check_box};

const NAME: &str = "trust-region";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRegionOptions {
    /// Interpolation points per model, in `[d+2, (d+1)(d+2)/2]`.
    /// `None` uses the upper end.
    pub interpolation_points: Option<usize>,
    pub initial_radius: f64,
    pub final_radius: f64,
    pub max_evaluations: usize,
}

impl Default for TrustRegionOptions {
    fn default() -> Self {
        Self {
            interpolation_points: None,
            initial_radius: 10.0,
            final_radius: 1e-6,
            max_evaluations: 100_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrustRegion {
    options: TrustRegionOptions,
}

impl TrustRegion {
    pub fn new(options: TrustRegionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TrustRegionOptions {
        &self.options
    }

    fn interpolation_points(&self, d: usize) -> FitResult<usize> {
        let min = d + 2;
        let max = (d + 1) * (d + 2) / 2;
        let npt = self.options.interpolation_points.unwrap_or(max);
        if npt < min || npt > max {
            return Err(FitError::InvalidOptions(format!(
                "{npt} interpolation points for {d} dimensions; expected {min}..={max}"
            )));
        }
        Ok(npt)
    }
}

impl BoundedOptimizer for TrustRegion {
    fn name(&self) -> &'static str {
        NAME
    }

    fn minimize(
        &self,
        objective: &mut dyn FnMut(&[f64]) -> f64,
        start: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> FitResult<OptimOutcome> {
        check_box(start, lower, upper)?;
        let o = &self.options;
        if !(o.final_radius > 0.0 && o.initial_radius > o.final_radius) {
            return Err(FitError::InvalidOptions(format!(
                "radii must satisfy 0 < final ({}) < initial ({})",
                o.final_radius, o.initial_radius
            )));
        }

        let d = start.len();
        let mut f = CountedObjective::new(objective, NAME, o.max_evaluations, start);
        let mut x = start.to_vec();
        let mut fx = f.eval(&x)?;
        if d == 0 {
            return Ok(f.finish(0, true));
        }

        let npt = self.interpolation_points(d)?;
        // Leading coordinates sampled on both sides; the rest once.
        let two_sided = (npt - d - 1).min(d);
        let pairs: Vec<(usize, usize)> = (0..d)
            .flat_map(|i| (i + 1..d).map(move |j| (i, j)))
            .take(npt.saturating_sub(2 * d + 1))
            .collect();
        let max_radius = (0..d)
            .map(|i| upper[i] - lower[i])
            .fold(0.0, f64::max);

        debug!(dims = d, npt, two_sided, "trust-region start");

        let mut radius = o.initial_radius;
        let mut iterations = 0;
        let mut g = vec![0.0; d];
        let mut h = DMatrix::<f64>::zeros(d, d);
        let mut t = vec![0.0; d];
        let mut probe = x.clone();
        let mut sample_best: (f64, Vec<f64>) = (f64::INFINITY, x.clone());

        while radius >= o.final_radius {
            iterations += 1;
            h.fill(0.0);
            sample_best.0 = f64::INFINITY;

            for i in 0..d {
                let step = radius.min((upper[i] - lower[i]) / 4.0);
                if step <= 0.0 {
                    g[i] = 0.0;
                    t[i] = 0.0;
                    continue;
                }
                if i >= two_sided {
                    let t1 = if x[i] + step <= upper[i] { step } else { -step };
                    probe.copy_from_slice(&x);
                    probe[i] = x[i] + t1;
                    let f1 = f.eval(&probe)?;
                    note_sample(&mut sample_best, f1, &probe);
                    let slope = (f1 - fx) / t1;
                    g[i] = if slope.is_finite() { slope } else { 0.0 };
                    t[i] = t1;
                    continue;
                }
                let (t1, t2) = if x[i] - step >= lower[i] && x[i] + step <= upper[i] {
                    (-step, step)
                } else if x[i] + 2.0 * step <= upper[i] {
                    (step, 2.0 * step)
                } else {
                    (-step, -2.0 * step)
                };

                probe.copy_from_slice(&x);
                probe[i] = x[i] + t1;
                let f1 = f.eval(&probe)?;
                note_sample(&mut sample_best, f1, &probe);
                probe[i] = x[i] + t2;
                let f2 = f.eval(&probe)?;
                note_sample(&mut sample_best, f2, &probe);

                let (gi, hii) = fit_quadratic(fx, t1, f1, t2, f2);
                g[i] = gi;
                h[(i, i)] = hii;
                t[i] = t1;
            }

            for &(i, j) in &pairs {
                if t[i] == 0.0 || t[j] == 0.0 {
                    continue;
                }
                probe.copy_from_slice(&x);
                probe[i] += t[i];
                probe[j] += t[j];
                let fij = f.eval(&probe)?;
                note_sample(&mut sample_best, fij, &probe);

                let q = fx
                    + g[i] * t[i]
                    + g[j] * t[j]
                    + 0.5 * (h[(i, i)] * t[i] * t[i] + h[(j, j)] * t[j] * t[j]);
                let hij = (fij - q) / (t[i] * t[j]);
                if hij.is_finite() {
                    h[(i, j)] = hij;
                    h[(j, i)] = hij;
                }
            }

            let s = minimize_model(&g, &h, &x, lower, upper, radius);
            let step_norm = s.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            let predicted = -model_change(&g, &h, &s);

            let mut rho = -1.0;
            let mut moved = false;
            if step_norm > 0.0 {
                for i in 0..d {
                    probe[i] = (x[i] + s[i]).clamp(lower[i], upper[i]);
                }
                let ft = f.eval(&probe)?;
                if predicted > 0.0 {
                    rho = (fx - ft) / predicted;
                }
                if ft < fx {
                    x.copy_from_slice(&probe);
                    fx = ft;
                    moved = true;
                }
            }
            if !moved && sample_best.0 < fx {
                fx = sample_best.0;
                x.copy_from_slice(&sample_best.1);
            }

            if rho > 0.75 && step_norm >= 0.99 * radius {
                radius = (2.0 * radius).min(max_radius);
            } else if rho < 0.25 {
                radius *= 0.5;
            } else if step_norm < 0.5 * radius {
                radius = (0.5 * radius).max(2.0 * step_norm);
            }
        }

        info!(
            evaluations = f.evaluations(),
            iterations,
            value = f.best_value(),
            "trust-region converged"
        );
        Ok(f.finish(iterations, true))
    }
}

fn note_sample(best: &mut (f64, Vec<f64>), value: f64, point: &[f64]) {
    if value < best.0 {
        best.0 = value;
        best.1.copy_from_slice(point);
    }
}

/// Gradient and curvature of the parabola through `(0, f0)`, `(t1, f1)`, `(t2, f2)`.
///
/// Non-finite samples give a flat model along that coordinate.
fn fit_quadratic(f0: f64, t1: f64, f1: f64, t2: f64, f2: f64) -> (f64, f64) {
    let det = 0.5 * t1 * t2 * (t2 - t1);
    let d1 = f1 - f0;
    let d2 = f2 - f0;
    let g = (0.5 * d1 * t2 * t2 - 0.5 * d2 * t1 * t1) / det;
    let h = (d2 * t1 - d1 * t2) / det;
    if g.is_finite() && h.is_finite() {
        (g, h)
    } else {
        (0.0, 0.0)
    }
}

/// `gᵀs + ½ sᵀHs`.
fn model_change(g: &[f64], h: &DMatrix<f64>, s: &[f64]) -> f64 {
    let d = g.len();
    let mut lin = 0.0;
    let mut quad = 0.0;
    for i in 0..d {
        lin += g[i] * s[i];
        for j in 0..d {
            quad += s[i] * h[(i, j)] * s[j];
        }
    }
    lin + 0.5 * quad
}

/// Projected-gradient minimization of the quadratic model over
/// `[lower − x, upper − x] ∩ [−radius, radius]`.
fn minimize_model(
    g: &[f64],
    h: &DMatrix<f64>,
    x: &[f64],
    lower: &[f64],
    upper: &[f64],
    radius: f64,
) -> Vec<f64> {
    let d = g.len();
    let lo: Vec<f64> = (0..d).map(|i| (lower[i] - x[i]).max(-radius)).collect();
    let up: Vec<f64> = (0..d).map(|i| (upper[i] - x[i]).min(radius)).collect();

    let g_max = g.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let mut s = vec![0.0; d];
    if g_max == 0.0 {
        return s;
    }

    // Gershgorin bound on the largest curvature.
    let curvature = (0..d)
        .map(|i| (0..d).map(|j| h[(i, j)].abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let alpha = if curvature > 0.0 {
        1.0 / curvature
    } else {
        radius / g_max
    };

    let mut grad = vec![0.0; d];
    for _ in 0..200 {
        for i in 0..d {
            grad[i] = g[i] + (0..d).map(|j| h[(i, j)] * s[j]).sum::<f64>();
        }
        let mut change = 0.0_f64;
        for i in 0..d {
            let next = (s[i] - alpha * grad[i]).clamp(lo[i], up[i]);
            change = change.max((next - s[i]).abs());
            s[i] = next;
        }
        if change <= 1e-12 * radius {
            break;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bowl(x: &[f64]) -> f64 {
        let a = x[0] - 30.0;
        let b = x[1] - 70.0;
        a * a + 2.0 * b * b + 0.5 * a * b
    }

    #[test]
    fn parabola_fit_is_exact() {
        // f(t) = 3 + 2t + 0.5·4·t²
        let f = |t: f64| 3.0 + 2.0 * t + 2.0 * t * t;
        let (g, h) = fit_quadratic(f(0.0), -0.5, f(-0.5), 1.0, f(1.0));
        assert!((g - 2.0).abs() < 1e-12);
        assert!((h - 4.0).abs() < 1e-12);
    }

    #[test]
    fn finds_interior_minimum() {
        let tr = TrustRegion::default();
        let mut f = |x: &[f64]| bowl(x);
        let out = tr
            .minimize(&mut f, &[50.0, 50.0], &[0.0, 0.0], &[100.0, 100.0])
            .unwrap();
        assert!(out.converged);
        assert!((out.point[0] - 30.0).abs() < 1e-3, "{:?}", out.point);
        assert!((out.point[1] - 70.0).abs() < 1e-3, "{:?}", out.point);
        assert!(out.value < 1e-6);
    }

    #[test]
    fn minimal_interpolation_set_still_converges() {
        let tr = TrustRegion::new(TrustRegionOptions {
            interpolation_points: Some(5),
            ..TrustRegionOptions::default()
        });
        let mut f = |x: &[f64]| bowl(x);
        let out = tr
            .minimize(&mut f, &[10.0, 90.0], &[0.0, 0.0], &[100.0, 100.0])
            .unwrap();
        assert!((out.point[0] - 30.0).abs() < 1e-2, "{:?}", out.point);
        assert!((out.point[1] - 70.0).abs() < 1e-2, "{:?}", out.point);
    }

    #[test]
    fn respects_bounds() {
        let tr = TrustRegion::default();
        let mut f = |x: &[f64]| (x[0] + 10.0).powi(2);
        let out = tr.minimize(&mut f, &[50.0], &[0.0], &[100.0]).unwrap();
        assert!(out.point[0] >= 0.0);
        assert!(out.point[0] < 1e-6, "{:?}", out.point);
    }

    #[test]
    fn zero_dimensions_evaluates_once() {
        let tr = TrustRegion::default();
        let mut calls = 0;
        let mut f = |_: &[f64]| {
            calls += 1;
            4.0
        };
        let out = tr.minimize(&mut f, &[], &[], &[]).unwrap();
        assert_eq!(out.evaluations, 1);
        assert_eq!(out.value, 4.0);
        assert_eq!(calls, 1);
    }

    #[test]
    fn budget_exhaustion_is_an_error() {
        let tr = TrustRegion::new(TrustRegionOptions {
            max_evaluations: 4,
            ..TrustRegionOptions::default()
        });
        let mut f = |x: &[f64]| bowl(x);
        let err = tr
            .minimize(&mut f, &[50.0, 50.0], &[0.0, 0.0], &[100.0, 100.0])
            .unwrap_err();
        assert!(matches!(err, FitError::OptimizerExhausted { evaluations: 4, .. }));
    }

    #[test]
    fn rejects_bad_interpolation_count() {
        let tr = TrustRegion::new(TrustRegionOptions {
            interpolation_points: Some(3),
            ..TrustRegionOptions::default()
        });
        let mut f = |x: &[f64]| bowl(x);
        assert!(matches!(
            tr.minimize(&mut f, &[50.0, 50.0], &[0.0, 0.0], &[100.0, 100.0]),
            Err(FitError::InvalidOptions(_))
        ));

        let tr = TrustRegion::new(TrustRegionOptions {
            interpolation_points: Some(7),
            ..TrustRegionOptions::default()
        });
        assert!(matches!(
            tr.minimize(&mut f, &[50.0, 50.0], &[0.0, 0.0], &[100.0, 100.0]),
            Err(FitError::InvalidOptions(_))
        ));
    }

    #[test]
    fn sparse_interpolation_set_converges() {
        // d + 2 points: one coordinate gets curvature, the other a slope.
        let tr = TrustRegion::new(TrustRegionOptions {
            interpolation_points: Some(4),
            ..TrustRegionOptions::default()
        });
        let mut calls = 0;
        let mut f = |x: &[f64]| {
            calls += 1;
            bowl(x)
        };
        let out = tr
            .minimize(&mut f, &[10.0, 90.0], &[0.0, 0.0], &[100.0, 100.0])
            .unwrap();
        assert!(out.converged);
        assert!((out.point[0] - 30.0).abs() < 1e-2, "{:?}", out.point);
        assert!((out.point[1] - 70.0).abs() < 1e-2, "{:?}", out.point);
        assert_eq!(out.evaluations, calls);
    }

    #[test]
    fn one_sided_coordinate_steps_inward_at_upper_bound() {
        let tr = TrustRegion::new(TrustRegionOptions {
            interpolation_points: Some(4),
            ..TrustRegionOptions::default()
        });
        let mut f = |x: &[f64]| (x[0] - 40.0).powi(2) + (x[1] - 40.0).powi(2);
        let out = tr
            .minimize(&mut f, &[50.0, 100.0], &[0.0, 0.0], &[100.0, 100.0])
            .unwrap();
        assert!(out.point[1] <= 100.0);
        assert!((out.point[0] - 40.0).abs() < 1e-2, "{:?}", out.point);
        assert!((out.point[1] - 40.0).abs() < 1e-2, "{:?}", out.point);
    }
}
