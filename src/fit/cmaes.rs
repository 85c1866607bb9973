//! Global search: covariance matrix adaptation evolution strategy (CMA-ES).
//!
//! A `(μ/μ_w, λ)` strategy with rank-one and rank-μ covariance updates and
//! cumulative step-size adaptation. Samples outside the box are repaired by
//! clamping and penalized by their L1 distance to the repaired point.
//!
//! The random generator is created from `seed` at the start of every run, so
//! repeated runs with the same options and objective are identical.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FitError, FitResult};
use crate::fit::optimizer::{BoundedOptimizer, CountedObjective, OptimOutcome, check_box};

const NAME: &str = "cma-es";

/// Spread of `max(D)/min(D)` (square root of the covariance condition number)
/// beyond which the search stops.
const MAX_AXIS_RATIO: f64 = 1e7;
const TOL_FUN: f64 = 1e-12;
const TOL_HIST_FUN: f64 = 1e-13;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionOptions {
    /// Population size is `multiplier × round(4 + 3 ln d)`.
    pub population_multiplier: f64,
    /// Initial step size in scaled units, shared by every dimension.
    pub sigma: f64,
    /// Per-dimension initial step sizes; overrides `sigma` when set.
    #[serde(default)]
    pub sigmas: Option<Vec<f64>>,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub max_iterations: usize,
    pub max_evaluations: usize,
    /// Stop as soon as a generation's best value drops below this.
    pub stop_fitness: Option<f64>,
    /// Number of initial generations that keep the covariance diagonal.
    pub diagonal_only: usize,
    pub seed: u64,
}

impl Default for EvolutionOptions {
    fn default() -> Self {
        Self {
            population_multiplier: 3.0,
            sigma: 10.0,
            sigmas: None,
            relative_tolerance: 1e-5,
            absolute_tolerance: 1e-5,
            max_iterations: 1000,
            max_evaluations: 2_000_000,
            stop_fitness: None,
            diagonal_only: 0,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CovarianceEvolution {
    options: EvolutionOptions,
}

impl CovarianceEvolution {
    pub fn new(options: EvolutionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvolutionOptions {
        &self.options
    }

    /// Offspring per generation for `d` dimensions.
    pub fn population_size(&self, d: usize) -> usize {
        let base = (4.0 + 3.0 * (d.max(1) as f64).ln()).round();
        ((self.options.population_multiplier * base) as usize).max(2)
    }

    fn validate(&self) -> FitResult<()> {
        let o = &self.options;
        if !(o.sigma > 0.0 && o.sigma.is_finite()) {
            return Err(FitError::InvalidOptions(format!(
                "sigma must be positive, got {}",
                o.sigma
            )));
        }
        if let Some(sigmas) = &o.sigmas {
            if let Some(bad) = sigmas.iter().find(|s| !(**s > 0.0 && s.is_finite())) {
                return Err(FitError::InvalidOptions(format!(
                    "per-dimension sigmas must be positive, got {bad}"
                )));
            }
        }
        if !(o.population_multiplier > 0.0) {
            return Err(FitError::InvalidOptions(format!(
                "population multiplier must be positive, got {}",
                o.population_multiplier
            )));
        }
        if o.relative_tolerance < 0.0 || o.absolute_tolerance < 0.0 {
            return Err(FitError::InvalidOptions("tolerances must be non-negative".to_string()));
        }
        if o.max_iterations == 0 {
            return Err(FitError::InvalidOptions("max_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Strategy parameters derived from the dimension and population size.
struct Strategy {
    weights: Vec<f64>,
    mueff: f64,
    cc: f64,
    cs: f64,
    c1: f64,
    cmu: f64,
    damps: f64,
    chi_n: f64,
}

impl Strategy {
    fn new(n: usize, lambda: usize, max_iterations: usize) -> Self {
        let nf = n as f64;
        let mu = lambda / 2;
        let raw: Vec<f64> = (0..mu)
            .map(|i| (mu as f64 + 0.5).ln() - ((i + 1) as f64).ln())
            .collect();
        let sum: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / sum).collect();
        let mueff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let cc = (4.0 + mueff / nf) / (nf + 4.0 + 2.0 * mueff / nf);
        let cs = (mueff + 2.0) / (nf + mueff + 3.0);
        let damps = (1.0 + 2.0 * (((mueff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0))
            * (1.0 - nf / (1e-6 + max_iterations as f64)).max(0.3)
            + cs;
        let c1 = 2.0 / ((nf + 1.3) * (nf + 1.3) + mueff);
        let cmu = (1.0 - c1)
            .min(2.0 * (mueff - 2.0 + 1.0 / mueff) / ((nf + 2.0) * (nf + 2.0) + mueff));
        let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));

        Self {
            weights,
            mueff,
            cc,
            cs,
            c1,
            cmu,
            damps,
            chi_n,
        }
    }
}

impl BoundedOptimizer for CovarianceEvolution {
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
        self.validate()?;
        let o = &self.options;

        let n = start.len();
        let mut f = CountedObjective::new(objective, NAME, o.max_evaluations, start);
        f.eval(start)?;
        if n == 0 {
            return Ok(f.finish(0, true));
        }

        let lambda = self.population_size(n);
        let st = Strategy::new(n, lambda, o.max_iterations);
        let mu = st.weights.len();
        let mut rng = StdRng::seed_from_u64(o.seed);

        // Largest initial step; per-dimension spread goes into D.
        let (sigma0, initial_d) = match &o.sigmas {
            Some(sigmas) if sigmas.len() != n => {
                return Err(FitError::InvalidOptions(format!(
                    "{} per-dimension sigmas for {n} dimensions",
                    sigmas.len()
                )));
            }
            Some(sigmas) => {
                let max = sigmas.iter().copied().fold(0.0, f64::max);
                (max, DVector::from_iterator(n, sigmas.iter().map(|s| s / max)))
            }
            None => (o.sigma, DVector::from_element(n, 1.0)),
        };
        let tol_x = 1e-11 * sigma0;
        let tol_up_x = 1e3 * sigma0;
        let history_len = 10 + (30.0 * n as f64 / lambda as f64) as usize;

        let mut xmean = DVector::from_column_slice(start);
        let mut sigma = sigma0;
        let mut pc = DVector::<f64>::zeros(n);
        let mut ps = DVector::<f64>::zeros(n);
        let mut b = DMatrix::<f64>::identity(n, n);
        let mut c = DMatrix::from_diagonal(&initial_d.component_mul(&initial_d));
        let mut bd = DMatrix::from_diagonal(&initial_d);
        let mut diag_d = initial_d;

        let mut history: Vec<f64> = Vec::with_capacity(history_len);
        let mut previous_best: Option<f64> = None;
        let mut converged = false;
        let mut iterations = 0;

        let mut arz = DMatrix::<f64>::zeros(n, lambda);
        let mut arx = DMatrix::<f64>::zeros(n, lambda);
        let mut fitness = vec![0.0; lambda];
        let mut repaired = vec![0.0; n];

        debug!(dims = n, lambda, mu, "cma-es start");

        'generations: loop {
            if iterations >= o.max_iterations {
                warn!(iterations, "cma-es stopped at the iteration cap");
                break;
            }
            iterations += 1;
            let diagonal = iterations <= o.diagonal_only;

            for k in 0..lambda {
                for i in 0..n {
                    arz[(i, k)] = StandardNormal.sample(&mut rng);
                }
                let z = arz.column(k);
                let step = if diagonal {
                    z.component_mul(&diag_d)
                } else {
                    &bd * z
                };
                let x = &xmean + step * sigma;
                arx.set_column(k, &x);

                let mut penalty = 0.0;
                for i in 0..n {
                    repaired[i] = x[i].clamp(lower[i], upper[i]);
                    penalty += (x[i] - repaired[i]).abs();
                }
                fitness[k] = f.eval(&repaired)? + penalty;
            }

            let mut order: Vec<usize> = (0..lambda).collect();
            order.sort_by(|&i, &j| fitness[i].total_cmp(&fitness[j]));
            let best_fitness = fitness[order[0]];
            let worst_fitness = fitness[order[lambda - 1]];

            let xold = xmean.clone();
            xmean.fill(0.0);
            let mut zmean = DVector::<f64>::zeros(n);
            for (w, &k) in st.weights.iter().zip(&order) {
                xmean += arx.column(k) * *w;
                zmean += arz.column(k) * *w;
            }

            // Cumulation of the evolution paths.
            let ps_dir = if diagonal { zmean.clone() } else { &b * &zmean };
            ps = ps * (1.0 - st.cs) + ps_dir * (st.cs * (2.0 - st.cs) * st.mueff).sqrt();
            let norm_ps = ps.norm();
            let hsig = norm_ps
                / (1.0 - (1.0 - st.cs).powi(2 * iterations as i32)).sqrt()
                / st.chi_n
                < 1.4 + 2.0 / (n as f64 + 1.0);
            let delta = (&xmean - &xold) / sigma;
            pc *= 1.0 - st.cc;
            if hsig {
                pc += &delta * (st.cc * (2.0 - st.cc) * st.mueff).sqrt();
            }

            // Covariance update (rank one + rank μ).
            let mut old_factor = 1.0 - st.c1 - st.cmu;
            if !hsig {
                old_factor += st.c1 * st.cc * (2.0 - st.cc);
            }
            let mut rank_mu = DMatrix::<f64>::zeros(n, n);
            for (w, &k) in st.weights.iter().zip(&order) {
                let y = (arx.column(k) - &xold) / sigma;
                rank_mu += &y * y.transpose() * *w;
            }
            c = &c * old_factor + &pc * pc.transpose() * st.c1 + rank_mu * st.cmu;
            c = (&c + c.transpose()) * 0.5;
            if diagonal {
                c = DMatrix::from_diagonal(&c.diagonal());
            }

            sigma *= ((norm_ps / st.chi_n - 1.0) * st.cs / st.damps).min(1.0).exp();

            // Decompose C = B·D²·Bᵀ.
            let eigen = SymmetricEigen::new(c.clone());
            let mut values = eigen.eigenvalues;
            let max_value = values.iter().copied().fold(f64::MIN, f64::max);
            let min_value = values.iter().copied().fold(f64::MAX, f64::min);
            if min_value <= 0.0 {
                let shift = max_value.max(0.0) / 1e14 - min_value.min(0.0);
                for v in values.iter_mut() {
                    *v += shift;
                }
                for i in 0..n {
                    c[(i, i)] += shift;
                }
            }
            if diagonal {
                b = DMatrix::identity(n, n);
                diag_d = c.diagonal().map(f64::sqrt);
            } else {
                b = eigen.eigenvectors;
                diag_d = values.map(|v| v.max(0.0).sqrt());
            }
            bd = &b * DMatrix::from_diagonal(&diag_d);

            // Stopping criteria.
            if let Some(target) = o.stop_fitness {
                if best_fitness < target {
                    converged = true;
                    break;
                }
            }

            let small_steps = (0..n).all(|i| sigma * pc[i].abs() <= tol_x)
                && (0..n).all(|i| sigma * c[(i, i)].sqrt() <= tol_x);
            if small_steps {
                converged = true;
                break;
            }
            if (0..n).any(|i| sigma * c[(i, i)].sqrt() > tol_up_x) {
                debug!(sigma, "cma-es step size diverged");
                break;
            }

            let history_best = history.iter().copied().fold(f64::INFINITY, f64::min);
            let history_worst = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if iterations > 2
                && history_worst.max(worst_fitness) - history_best.min(best_fitness) < TOL_FUN
            {
                converged = true;
                break;
            }
            if iterations > history_len && history_worst - history_best < TOL_HIST_FUN {
                converged = true;
                break;
            }

            let d_max = diag_d.max();
            let d_min = diag_d.min();
            if d_min <= 0.0 || d_max / d_min > MAX_AXIS_RATIO {
                debug!(d_max, d_min, "cma-es covariance ill-conditioned");
                break;
            }

            if let Some(prev) = previous_best {
                let diff = (prev - best_fitness).abs();
                let size = prev.abs().max(best_fitness.abs());
                if diff <= size * o.relative_tolerance || diff <= o.absolute_tolerance {
                    converged = true;
                    break 'generations;
                }
            }
            previous_best = Some(best_fitness);

            // Flat fitness: widen the search.
            let flat_index = ((0.1 + lambda as f64 / 4.0) as usize).min(lambda - 1);
            if best_fitness == fitness[order[flat_index]] {
                sigma *= (0.2 + st.cs / st.damps).exp();
            }
            if iterations > 2
                && history_worst.max(best_fitness) - history_best.min(best_fitness) == 0.0
            {
                sigma *= (0.2 + st.cs / st.damps).exp();
            }

            if history.len() == history_len {
                history.remove(0);
            }
            history.push(best_fitness);
        }

        info!(
            evaluations = f.evaluations(),
            iterations,
            converged,
            value = f.best_value(),
            "cma-es finished"
        );
        Ok(f.finish(iterations, converged))
    }
}
