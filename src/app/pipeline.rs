//! Shared analysis pipelines used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflows:
//! table -> preprocess -> fit -> report/plot data (per count column), and
//! table -> keyed lookups -> derived quantities (per category).
//!
//! Categories are independent. They are evaluated on the rayon pool and
//! collected in discovery order, so outputs match a sequential run. A failing
//! category is recorded and the remaining ones still run.

use rayon::prelude::*;
use tracing::{error, info};

use crate::derived::{ChshResult, CoherenceMeasurement, categories, chsh, measure};
use crate::domain::{
    Bounds, CategoryFailure, CoherenceSchema, CorrelationSchema, FitReport, FitResult, ModelKind, PlotData, Polarization,
    TransmissionConfig, WavePacketConfig, alpha_column, transmission_guess,
};
use crate::error::AnalysisError;
use crate::fit::{FitOptions, PreparedData, PreprocessOptions, fit, preprocess};
use crate::report::{build_fit_report, plot_data};
use crate::table::MeasurementTable;

/// Results of a multi-category run, in discovery order.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub successes: Vec<(String, T)>,
    pub failures: Vec<CategoryFailure>,
}

impl<T> Outcome<T> {
    fn from_results(results: Vec<(String, Result<T, AnalysisError>)>) -> Self {
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for (category, result) in results {
            match result {
                Ok(v) => successes.push((category, v)),
                Err(err) => {
                    error!(%category, error = %err, "category failed");
                    failures.push(CategoryFailure { category, error: err });
                }
            }
        }
        Self { successes, failures }
    }
}

/// Everything produced for one fitted column.
#[derive(Debug, Clone)]
pub struct FittedColumn {
    pub column: String,
    pub prepared: PreparedData,
    pub fit: FitResult,
    pub report: FitReport,
    pub plot: PlotData,
}

/// Preprocess, fit and report one `(x, counts)` series.
#[allow(clippy::too_many_arguments)]
pub fn fit_series(
    model: ModelKind,
    column: &str,
    x: &[f64],
    y: &[f64],
    prep_opts: PreprocessOptions,
    initial_guess: &[f64],
    bounds: &Bounds,
    fit_opts: &FitOptions,
) -> Result<FittedColumn, AnalysisError> {
    let prepared = preprocess(x, y, prep_opts)?;
    let fit = fit(model, &prepared.dataset, initial_guess, bounds, fit_opts)?;
    let report = build_fit_report(&fit, &prepared.normalization, model == ModelKind::TransmissionLaw);
    let plot = plot_data(&prepared, &fit)?;
    info!(
        column,
        model = model.display_name(),
        n = fit.n_points,
        iterations = fit.iterations,
        chi2 = fit.chi_square,
        "fit complete"
    );
    Ok(FittedColumn {
        column: column.to_string(),
        prepared,
        fit,
        report,
        plot,
    })
}

/// Fit the transmission law to every configured `alpha=<N>` column.
///
/// A missing beta column fails the whole run. A missing alpha column, or an
/// angle that is not one of the four analyzer settings, fails only that alpha.
pub fn run_transmission(
    table: &MeasurementTable,
    config: &TransmissionConfig,
    fit_opts: &FitOptions,
) -> Result<Outcome<FittedColumn>, AnalysisError> {
    let beta = table.numeric_column(&config.beta_column)?;
    let model = ModelKind::TransmissionLaw;
    let bounds = model.default_bounds();

    let results: Vec<(String, Result<FittedColumn, AnalysisError>)> = config
        .alphas
        .par_iter()
        .enumerate()
        .map(|(i, &alpha)| {
            let column = alpha_column(alpha);
            let result = analyzer_setting(alpha)
                .and_then(|position| {
                    info!(alpha, %position, "fitting transmission curve");
                    table.numeric_column(&column)
                })
                .and_then(|counts| {
                    let guess = transmission_guess(config.phase_guess(i));
                    fit_series(
                        model,
                        &column,
                        &beta,
                        &counts,
                        PreprocessOptions::transmission(),
                        &guess,
                        &bounds,
                        fit_opts,
                    )
                });
            (column, result)
        })
        .collect();

    Ok(Outcome::from_results(results))
}

/// Analyzer setting for a transmission alpha angle.
fn analyzer_setting(alpha: i64) -> Result<Polarization, AnalysisError> {
    Polarization::from_alpha_degrees(alpha).ok_or_else(|| {
        AnalysisError::InvalidInput(format!(
            "alpha={alpha} is not an analyzer setting (expected 0, 45, 90 or 135)"
        ))
    })
}

/// Fit the wave-packet model to every configured column.
pub fn run_wave_packet(
    table: &MeasurementTable,
    config: &WavePacketConfig,
    fit_opts: &FitOptions,
) -> Result<Outcome<FittedColumn>, AnalysisError> {
    let model = ModelKind::WavePacket;
    if config.initial_guess.len() != model.param_count() {
        return Err(AnalysisError::InvalidInput(format!(
            "wave-packet guess needs {} values, got {}",
            model.param_count(),
            config.initial_guess.len()
        )));
    }
    let x = table.numeric_column(&config.x_column)?;
    let bounds = model.default_bounds();

    let results: Vec<(String, Result<FittedColumn, AnalysisError>)> = config
        .columns
        .par_iter()
        .map(|column| {
            let result = table.numeric_column(column).and_then(|counts| {
                fit_series(
                    model,
                    column,
                    &x,
                    &counts,
                    PreprocessOptions::wave_packet(),
                    &config.initial_guess,
                    &bounds,
                    fit_opts,
                )
            });
            (column.clone(), result)
        })
        .collect();

    Ok(Outcome::from_results(results))
}

/// Correlation values and `S` for a correlation table.
pub fn run_chsh(table: &MeasurementTable, schema: &CorrelationSchema) -> Result<ChshResult, AnalysisError> {
    let res = chsh(table, schema)?;
    info!(s = %res.s, n_sigma = ?res.n_sigma, "CHSH evaluated");
    Ok(res)
}

/// `g2` and `g2h` for every `(current, duration)` category.
pub fn run_coherence(
    table: &MeasurementTable,
    schema: &CoherenceSchema,
) -> Result<Outcome<CoherenceMeasurement>, AnalysisError> {
    let cats = categories(table, schema)?;
    info!(categories = cats.len(), "coherence categories discovered");

    let results: Vec<(String, Result<CoherenceMeasurement, AnalysisError>)> = cats
        .par_iter()
        .map(|cat| (cat.to_string(), measure(table, schema, cat)))
        .collect();

    Ok(Outcome::from_results(results))
}
