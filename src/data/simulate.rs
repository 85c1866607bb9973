//! Synthetic spectra for tests, demos and `mfit simulate`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{AmplitudeMode, LineShape, SignalShape};
use crate::error::{FitError, FitResult};
use crate::fit::FitEngine;

/// What to synthesize: signals, their parameters and noise.
#[derive(Debug, Clone)]
pub struct SimulationSpec<'a> {
    pub signals: &'a [SignalShape],
    pub mode: AmplitudeMode,
    pub line_shape: LineShape,
    /// Full physical parameter vector in layout order.
    pub params: &'a [f64],
    /// Amplitude columns; only read in separable mode.
    pub amplitudes: &'a [f64],
    /// Standard deviation of additive Gaussian noise (0 for none).
    pub noise_sd: f64,
    pub seed: u64,
}

/// Sample positions `0, 1, ..., n - 1`.
pub fn sample_axis(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

/// Model intensities on `x` plus seeded Gaussian noise.
pub fn simulate_spectrum(spec: &SimulationSpec<'_>, x: &[f64]) -> FitResult<Vec<f64>> {
    if !(spec.noise_sd >= 0.0 && spec.noise_sd.is_finite()) {
        return Err(FitError::InvalidData(format!(
            "noise standard deviation must be finite and >= 0, got {}",
            spec.noise_sd
        )));
    }

    let mut engine = FitEngine::new(
        spec.signals,
        spec.mode,
        spec.line_shape,
        x.to_vec(),
        vec![0.0; x.len()],
    )?;
    let mut y = engine.synthesize(spec.params, spec.amplitudes)?;

    if spec.noise_sd > 0.0 {
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let normal = Normal::new(0.0, spec.noise_sd)
            .map_err(|e| FitError::InvalidData(format!("noise distribution error: {e}")))?;
        for v in &mut y {
            *v += normal.sample(&mut rng);
        }
    }
    Ok(y)
}
