//! Synthetic scans for dry runs and tests.
//!
//! Counts follow the model catalogue exactly; with noise enabled each count is
//! replaced by a Poisson draw with that mean, which is what the fitter's
//! `sqrt(n)` weights assume.

use std::f64::consts::PI;
use std::io::Write;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Poisson;

use crate::domain::{DEFAULT_ALPHAS, DEFAULT_PHASE_GUESS, ModelKind, SimulateConfig, alpha_column};
use crate::error::AppError;
use crate::models::predict;

/// Visibility of the synthetic transmission curves.
const TRANSMISSION_VISIBILITY: f64 = 0.95;

/// Phase offset (radians) between neighbouring 45° alpha curves.
///
/// The curves sit just around `DEFAULT_PHASE_GUESS` so a default
/// `transmission` run starts inside the right basin for every alpha.
const TRANSMISSION_PHASE_STEP: f64 = 0.05;

/// Stage position of the synthetic wave packet's centre.
const WAVE_PACKET_CENTER: f64 = 10.0;

/// Half width of the synthetic interferometer scan.
const WAVE_PACKET_HALF_RANGE: f64 = 1.5;

const WAVE_PACKET_STEPS: usize = 601;

/// A generated scan: one x column followed by count columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScan {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Generate the scan described by `config`.
pub fn generate_scan(config: &SimulateConfig) -> Result<SyntheticScan, AppError> {
    if !(config.peak_counts.is_finite() && config.peak_counts > 0.0) {
        return Err(AppError::new(2, "Peak counts must be finite and > 0."));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);

    match config.model {
        ModelKind::TransmissionLaw => transmission_scan(config, &mut rng),
        ModelKind::WavePacket => wave_packet_scan(config, &mut rng),
    }
}

/// Polarizer scan: `beta` in 5° steps over a full turn, one column per alpha.
fn transmission_scan(config: &SimulateConfig, rng: &mut StdRng) -> Result<SyntheticScan, AppError> {
    let mut columns = vec!["beta".to_string()];
    columns.extend(DEFAULT_ALPHAS.iter().map(|&a| alpha_column(a)));

    let mut rows = Vec::with_capacity(72);
    for step in 0..72 {
        let beta = 5.0 * step as f64;
        let mut row = vec![beta];
        for &alpha in &DEFAULT_ALPHAS {
            let params = transmission_truth(config.peak_counts, alpha);
            let mean = predict(ModelKind::TransmissionLaw, beta.to_radians(), &params);
            row.push(counts(mean, config.noise, rng)?);
        }
        rows.push(row);
    }
    Ok(SyntheticScan { columns, rows })
}

/// Interferometer scan around `WAVE_PACKET_CENTER`, columns as a converted scan log.
fn wave_packet_scan(config: &SimulateConfig, rng: &mut StdRng) -> Result<SyntheticScan, AppError> {
    let columns = vec!["x".to_string(), "coincidence 01".to_string()];
    let params = wave_packet_truth(config.peak_counts);

    let mut rows = Vec::with_capacity(WAVE_PACKET_STEPS);
    for i in 0..WAVE_PACKET_STEPS {
        let offset = -WAVE_PACKET_HALF_RANGE
            + 2.0 * WAVE_PACKET_HALF_RANGE * i as f64 / (WAVE_PACKET_STEPS - 1) as f64;
        let mean = predict(ModelKind::WavePacket, offset, &params);
        rows.push(vec![WAVE_PACKET_CENTER + offset, counts(mean, config.noise, rng)?]);
    }
    Ok(SyntheticScan { columns, rows })
}

/// Raw-unit parameters `[a, b, c, d]` of the synthetic curve for `alpha` (c, d in radians).
pub fn transmission_truth(peak_counts: f64, alpha: i64) -> [f64; 4] {
    let phase = DEFAULT_PHASE_GUESS + TRANSMISSION_PHASE_STEP * (alpha as f64 / 45.0 - 1.0);
    [peak_counts, TRANSMISSION_VISIBILITY, PI / 4.0, phase]
}

/// Raw-unit parameters `[I, f, σ, φ]` of the synthetic wave packet.
///
/// Zero phase puts the brightest fringe on a grid point at the stage centre,
/// which is where peak centering expects it.
pub fn wave_packet_truth(peak_counts: f64) -> [f64; 4] {
    [peak_counts, 1.0, 20.0, 0.0]
}

fn counts(mean: f64, noise: bool, rng: &mut StdRng) -> Result<f64, AppError> {
    if !noise || mean <= 0.0 {
        return Ok(mean.max(0.0).round());
    }
    let poisson = Poisson::new(mean)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    Ok(poisson.sample(rng))
}

/// Write a scan as CSV.
pub fn write_scan_csv<W: Write>(writer: W, scan: &SyntheticScan) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(&scan.columns)
        .map_err(|e| AppError::new(2, format!("Failed to write CSV header: {e}")))?;
    for row in &scan.rows {
        w.write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| AppError::new(2, format!("Failed to write CSV row: {e}")))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))
}
