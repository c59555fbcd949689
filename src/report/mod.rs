//! Reporting: fit reports in raw units, plot series and terminal summaries.
//!
//! The fitter works on normalized data (y divided by its maximum, angles in
//! radians). Everything produced here is mapped back to the units of the input
//! table using the `Normalization` returned by preprocessing.

use chrono::Utc;

use crate::domain::{AxisUnit, CurvePoint, FitReport, FitResult, ParamRole, PlotData, PlotPoint};
use crate::error::AnalysisError;
use crate::fit::{Normalization, PreparedData};
use crate::math::min_max;
use crate::models::predict;

pub mod format;

pub use format::*;

/// Samples on the fitted-curve grid of `PlotData`.
pub const CURVE_SAMPLES: usize = 500;

/// Map one fitted parameter (or its error) back to raw units.
pub fn unnormalize(role: ParamRole, value: f64, norm: &Normalization) -> f64 {
    match role {
        ParamRole::Amplitude => value * norm.y_scale,
        ParamRole::Dimensionless => value,
        ParamRole::AxisAngle => match norm.x_unit {
            AxisUnit::Native => value,
            AxisUnit::Degrees => value.to_degrees(),
        },
    }
}

/// `100 · error / |value|`; NaN (serialized as `null`) when the value is zero.
pub fn percentage_error(value: f64, error: f64) -> f64 {
    if value == 0.0 {
        f64::NAN
    } else {
        100.0 * error / value.abs()
    }
}

/// Assemble the persisted report for one fit.
///
/// `max_value` is the transmission path's raw count maximum; pass `false` for
/// models whose report omits it.
pub fn build_fit_report(fit: &FitResult, norm: &Normalization, include_max_value: bool) -> FitReport {
    let roles = fit.model.param_roles();
    let errors = fit.errors();

    let unnormalized_result: Vec<f64> = fit
        .parameters
        .iter()
        .zip(roles)
        .map(|(&p, &role)| unnormalize(role, p, norm))
        .collect();
    let unnormalized_errors: Vec<f64> = errors
        .iter()
        .zip(roles)
        .map(|(&e, &role)| unnormalize(role, e, norm).abs())
        .collect();
    let percentage_errors = fit
        .parameters
        .iter()
        .zip(errors.iter())
        .map(|(&p, &e)| percentage_error(p, e))
        .collect();

    FitReport {
        model: fit.model,
        parameter_names: fit.model.param_names().iter().map(|s| s.to_string()).collect(),
        result: fit.parameters.clone(),
        errors,
        unnormalized_result,
        unnormalized_errors,
        percentage_errors,
        covariance: fit.covariance.clone(),
        chi2: fit.chi_square,
        max_value: include_max_value.then_some(norm.y_scale),
        n_points: fit.n_points,
        generated_at: Utc::now(),
    }
}

/// Data, fitted values and residuals in raw units, plus a dense fitted curve.
pub fn plot_data(prepared: &PreparedData, fit: &FitResult) -> Result<PlotData, AnalysisError> {
    let norm = &prepared.normalization;
    let raw_fit = |x: f64| predict(fit.model, norm.fit_x(x), &fit.parameters) * norm.y_scale;

    let mut points = Vec::with_capacity(prepared.raw_x.len());
    for (&x, &y) in prepared.raw_x.iter().zip(prepared.raw_y.iter()) {
        let y_fit = raw_fit(x);
        if !y_fit.is_finite() {
            return Err(AnalysisError::ConvergenceFailure {
                reason: format!("non-finite model prediction at x={x}"),
            });
        }
        points.push(PlotPoint {
            x,
            y,
            y_err: y.sqrt(),
            y_fit,
            residual: y - y_fit,
        });
    }

    let curve = match min_max(&prepared.raw_x) {
        Some((lo, hi)) if hi > lo => {
            let last = (CURVE_SAMPLES - 1) as f64;
            (0..CURVE_SAMPLES)
                .map(|i| {
                    let x = lo + (hi - lo) * i as f64 / last;
                    CurvePoint { x, y_fit: raw_fit(x) }
                })
                .collect()
        }
        _ => Vec::new(),
    };

    Ok(PlotData { points, curve })
}
