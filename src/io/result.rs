//! Fit result JSON.
//!
//! The result file is the portable record of a fit:
//! - tool + timestamp
//! - amplitude mode and line shape
//! - the optimizer report (parameters, amplitudes, decoded signals)

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AmplitudeMode, LineShape};
use crate::error::AppError;
use crate::fit::FitReport;

#[derive(Debug, Clone, Serialize)]
pub struct ResultFile<'a> {
    pub tool: &'static str,
    pub generated_at: DateTime<Utc>,
    pub mode: AmplitudeMode,
    pub line_shape: LineShape,
    pub samples: usize,
    pub fit: &'a FitReport,
}

/// Subset of a result file read back for inspection.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultSummary {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub samples: usize,
}

/// Write a fit result JSON file.
pub fn write_result_json(
    path: &Path,
    report: &FitReport,
    mode: AmplitudeMode,
    line_shape: LineShape,
    samples: usize,
) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display()))
    })?;

    let result = ResultFile {
        tool: "mfit",
        generated_at: Utc::now(),
        mode,
        line_shape,
        samples,
        fit: report,
    };

    serde_json::to_writer_pretty(file, &result)
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))?;

    Ok(())
}
