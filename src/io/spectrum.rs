//! Spectrum CSV read/write.
//!
//! Spectra are two-column CSV files with an `x,y` header. Fit exports add the
//! modeled intensity and residual per sample.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct SpectrumRow {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct ModelRow {
    x: f64,
    y: f64,
    model: f64,
    residual: f64,
}

/// Sampled 1-D intensities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Read an `x,y` spectrum CSV.
pub fn read_spectrum_csv(path: &Path) -> Result<Spectrum, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open spectrum CSV '{}': {e}", path.display()))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut spectrum = Spectrum::default();
    for (idx, row) in reader.deserialize::<SpectrumRow>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let row = row.map_err(|e| AppError::new(2, format!("Spectrum CSV line {line}: {e}")))?;
        if !(row.x.is_finite() && row.y.is_finite()) {
            return Err(AppError::new(
                2,
                format!("Spectrum CSV line {line}: non-finite value"),
            ));
        }
        spectrum.x.push(row.x);
        spectrum.y.push(row.y);
    }

    if spectrum.is_empty() {
        return Err(AppError::new(
            2,
            format!("Spectrum CSV '{}' has no rows.", path.display()),
        ));
    }
    Ok(spectrum)
}

/// Write an `x,y` spectrum CSV.
pub fn write_spectrum_csv(path: &Path, x: &[f64], y: &[f64]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(2, format!("Failed to create spectrum CSV '{}': {e}", path.display()))
    })?;
    for (&x, &y) in x.iter().zip(y) {
        writer
            .serialize(SpectrumRow { x, y })
            .map_err(|e| AppError::new(2, format!("Failed to write spectrum CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush spectrum CSV: {e}")))?;
    Ok(())
}

/// Write observed, modeled and residual intensities per sample.
pub fn write_model_csv(path: &Path, x: &[f64], y: &[f64], model: &[f64]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(2, format!("Failed to create model CSV '{}': {e}", path.display()))
    })?;
    for ((&x, &y), &model) in x.iter().zip(y).zip(model) {
        writer
            .serialize(ModelRow {
                x,
                y,
                model,
                residual: y - model,
            })
            .map_err(|e| AppError::new(2, format!("Failed to write model CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush model CSV: {e}")))?;
    Ok(())
}
