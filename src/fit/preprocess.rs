//! Turn a raw `(x, counts)` series into a `FitDataset`.
//!
//! Steps, in order:
//! 1. validate (equal lengths, finite, non-negative counts)
//! 2. optional outlier-window trimming (isolates an interference feature from
//!    a flat background)
//! 3. drop zero-count points (their Poisson sigma would be zero)
//! 4. optional degrees → radians conversion of x
//! 5. optional centering of x on the peak count
//! 6. normalize y by its maximum; `sigma_i = sqrt(y_i) / y_max`
//!
//! The normalization constants are returned so fit outputs can be mapped back
//! to raw units.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{AxisUnit, FitDataset};
use crate::error::AnalysisError;
use crate::math::{argmax, mean, min_max, population_std};

/// Which optional steps to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub trim_outliers: bool,
    pub x_unit: AxisUnit,
    pub center_on_peak: bool,
}

impl PreprocessOptions {
    /// Angle scans: x in degrees, no trimming.
    pub fn transmission() -> Self {
        Self {
            trim_outliers: false,
            x_unit: AxisUnit::Degrees,
            center_on_peak: false,
        }
    }

    /// Interferometer scans: trimmed to the packet and centred on its peak.
    pub fn wave_packet() -> Self {
        Self {
            trim_outliers: true,
            x_unit: AxisUnit::Native,
            center_on_peak: true,
        }
    }
}

/// Constants needed to map between raw and fit units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Maximum raw count; fit-space `y = raw / y_scale`.
    pub y_scale: f64,
    pub x_unit: AxisUnit,
    /// Subtracted from the converted x (peak position), zero when not centred.
    pub x_offset: f64,
}

impl Normalization {
    /// Map a raw x value into fit space.
    pub fn fit_x(&self, raw_x: f64) -> f64 {
        let x = match self.x_unit {
            AxisUnit::Native => raw_x,
            AxisUnit::Degrees => raw_x.to_radians(),
        };
        x - self.x_offset
    }
}

/// Output of preprocessing.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub dataset: FitDataset,
    pub normalization: Normalization,
    /// Raw x of the retained points (for plot data).
    pub raw_x: Vec<f64>,
    /// Raw counts of the retained points.
    pub raw_y: Vec<f64>,
    pub trimmed: usize,
    pub dropped_zero: usize,
}

/// Run the preprocessing steps selected by `opts`.
pub fn preprocess(x: &[f64], y: &[f64], opts: PreprocessOptions) -> Result<PreparedData, AnalysisError> {
    validate_series(x, y)?;

    let (x, y, trimmed) = if opts.trim_outliers {
        let (tx, ty) = trim_outlier_window(x, y)?;
        let trimmed = x.len() - tx.len();
        debug!(kept = tx.len(), trimmed, "outlier window applied");
        (tx, ty, trimmed)
    } else {
        (x.to_vec(), y.to_vec(), 0)
    };

    let (raw_x, raw_y): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y.iter())
        .filter(|(_, yi)| **yi != 0.0)
        .map(|(&xi, &yi)| (xi, yi))
        .unzip();
    let dropped_zero = x.len() - raw_x.len();
    if dropped_zero > 0 {
        warn!(dropped_zero, "dropping zero-count points (zero Poisson sigma)");
    }
    if raw_y.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "no non-zero counts remain after preprocessing".to_string(),
        ));
    }

    let x_offset = if opts.center_on_peak {
        let peak = argmax(&raw_y).unwrap_or(0);
        convert_x(raw_x[peak], opts.x_unit)
    } else {
        0.0
    };
    let y_scale = raw_y.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let normalization = Normalization {
        y_scale,
        x_unit: opts.x_unit,
        x_offset,
    };

    let fit_x: Vec<f64> = raw_x.iter().map(|&v| normalization.fit_x(v)).collect();
    let fit_y: Vec<f64> = raw_y.iter().map(|&v| v / y_scale).collect();
    let sigma = poisson_sigma(&raw_y, y_scale);

    let dataset = FitDataset::new(fit_x, fit_y, sigma)?;
    Ok(PreparedData {
        dataset,
        normalization,
        raw_x,
        raw_y,
        trimmed,
        dropped_zero,
    })
}

/// Keep only the window around points deviating more than one std from the mean.
///
/// `x_std = (x_max − x_min)/√12` (std of a uniform spread over the scan); the
/// window spans the selected x range widened by `x_std/2` on each side and
/// excludes its endpoints.
pub fn trim_outlier_window(x: &[f64], y: &[f64]) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
    validate_series(x, y)?;
    let (x_min, x_max) = min_max(x).ok_or(AnalysisError::TrimmingDegenerate)?;
    let x_std = (x_max - x_min) / 12f64.sqrt();
    let y_mean = mean(y).ok_or(AnalysisError::TrimmingDegenerate)?;
    let y_std = population_std(y).ok_or(AnalysisError::TrimmingDegenerate)?;

    let selected: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .filter(|(_, yi)| (**yi - y_mean).abs() > y_std)
        .map(|(&xi, _)| xi)
        .collect();
    let (sel_min, sel_max) = min_max(&selected).ok_or(AnalysisError::TrimmingDegenerate)?;
    let start = sel_min - x_std / 2.0;
    let end = sel_max + x_std / 2.0;

    Ok(x.iter()
        .zip(y.iter())
        .filter(|(xi, _)| start < **xi && **xi < end)
        .map(|(&xi, &yi)| (xi, yi))
        .unzip())
}

/// Poisson weights: a raw count `n` has variance `n`, so `sigma = sqrt(n) / scale`.
pub fn poisson_sigma(counts: &[f64], scale: f64) -> Vec<f64> {
    counts.iter().map(|&n| n.sqrt() / scale).collect()
}

fn convert_x(x: f64, unit: AxisUnit) -> f64 {
    match unit {
        AxisUnit::Native => x,
        AxisUnit::Degrees => x.to_radians(),
    }
}

fn validate_series(x: &[f64], y: &[f64]) -> Result<(), AnalysisError> {
    if x.len() != y.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "x and y differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(AnalysisError::InvalidInput("empty series".to_string()));
    }
    if let Some(v) = x.iter().chain(y.iter()).find(|v| !v.is_finite()) {
        return Err(AnalysisError::InvalidInput(format!("non-finite value {v} in series")));
    }
    if let Some(v) = y.iter().find(|v| **v < 0.0) {
        return Err(AnalysisError::InvalidInput(format!("negative count {v} in series")));
    }
    Ok(())
}
