//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and derivation
//! - exported to JSON/CSV
//! - compared in tests without touching the filesystem

use std::f64::consts::PI;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// The fixed model catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// `y = a/2 · (1 − b·sin((x − d)/c))`
    #[value(name = "transmission")]
    TransmissionLaw,
    /// `y = I/2 · (1 + exp(−(π f x)² / (4 ln 2)) · cos(2π σ x + φ))`
    #[value(name = "wave-packet")]
    WavePacket,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::TransmissionLaw => "transmission law",
            ModelKind::WavePacket => "wave packet",
        }
    }

    pub fn param_count(self) -> usize {
        self.param_names().len()
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::TransmissionLaw => &["amplitude", "visibility", "period_scale", "phase"],
            ModelKind::WavePacket => &["intensity", "envelope_frequency", "carrier_frequency", "phase"],
        }
    }

    /// How each parameter is mapped back to raw units after a normalized fit.
    pub fn param_roles(self) -> &'static [ParamRole] {
        match self {
            ModelKind::TransmissionLaw => &[
                ParamRole::Amplitude,
                ParamRole::Dimensionless,
                ParamRole::AxisAngle,
                ParamRole::AxisAngle,
            ],
            // The carrier phase is an angle but not in x units, so it is not
            // converted with the axis.
            ModelKind::WavePacket => &[
                ParamRole::Amplitude,
                ParamRole::Dimensionless,
                ParamRole::Dimensionless,
                ParamRole::Dimensionless,
            ],
        }
    }

    /// Box constraints used when fitting normalized data.
    ///
    /// The transmission law is periodic, so every parameter is held in
    /// `[0, 6π]` to keep the optimizer on the physical branch.
    pub fn default_bounds(self) -> Bounds {
        match self {
            ModelKind::TransmissionLaw => Bounds::uniform(4, 0.0, 6.0 * PI),
            ModelKind::WavePacket => Bounds::unbounded(4),
        }
    }
}

/// Role of a parameter for unnormalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    /// Scales with y; multiplied back by the normalization maximum.
    Amplitude,
    /// Passed through unchanged.
    Dimensionless,
    /// Measured in x units; converted back to degrees when x was converted.
    AxisAngle,
}

/// Unit of the raw x column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisUnit {
    /// Used as-is.
    Native,
    /// Degrees, converted to radians before fitting.
    Degrees,
}

/// Per-parameter box constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
        Self {
            lower: vec![lower; n],
            upper: vec![upper; n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params.len() == self.len()
            && params
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&p, (&lo, &hi))| p >= lo && p <= hi)
    }

    /// Project `params` into the box in place.
    pub fn clamp(&self, params: &mut [f64]) {
        for (p, (&lo, &hi)) in params.iter_mut().zip(self.lower.iter().zip(self.upper.iter())) {
            *p = p.clamp(lo, hi);
        }
    }
}

/// Polarization setting of the first analyzer.
///
/// A closed set: the orthogonal setting is an operation on the enum rather
/// than a string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    /// Horizontal.
    H,
    /// Vertical.
    V,
    /// Diagonal (+45°).
    Plus,
    /// Anti-diagonal (−45°).
    Minus,
}

impl Polarization {
    pub fn orthogonal(self) -> Self {
        match self {
            Polarization::H => Polarization::V,
            Polarization::V => Polarization::H,
            Polarization::Plus => Polarization::Minus,
            Polarization::Minus => Polarization::Plus,
        }
    }

    /// Polarizer angle (degrees) to setting: 0 → H, 45 → +, 90 → V, 135 → −.
    pub fn from_alpha_degrees(alpha: i64) -> Option<Self> {
        match alpha.rem_euclid(180) {
            0 => Some(Polarization::H),
            45 => Some(Polarization::Plus),
            90 => Some(Polarization::V),
            135 => Some(Polarization::Minus),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Polarization::H => "H",
            Polarization::V => "V",
            Polarization::Plus => "+",
            Polarization::Minus => "-",
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Polarization {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "H" | "h" => Ok(Polarization::H),
            "V" | "v" => Ok(Polarization::V),
            "+" | "P" | "p" => Ok(Polarization::Plus),
            "-" | "\u{2212}" | "M" | "m" => Ok(Polarization::Minus),
            other => Err(AnalysisError::InvalidInput(format!(
                "unknown polarization label `{other}` (expected H, V, + or -)"
            ))),
        }
    }
}

/// Preprocessed data ready for the fitter.
#[derive(Debug, Clone, PartialEq)]
pub struct FitDataset {
    x: Vec<f64>,
    y: Vec<f64>,
    sigma: Vec<f64>,
}

impl FitDataset {
    /// Build a dataset, checking equal lengths, finite values and `sigma > 0`.
    pub fn new(x: Vec<f64>, y: Vec<f64>, sigma: Vec<f64>) -> Result<Self, AnalysisError> {
        if x.len() != y.len() || x.len() != sigma.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "dataset columns differ in length: x={}, y={}, sigma={}",
                x.len(),
                y.len(),
                sigma.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidInput("dataset contains non-finite values".into()));
        }
        if let Some(s) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(AnalysisError::InvalidInput(format!(
                "sigma must be finite and > 0, got {s}"
            )));
        }
        Ok(Self { x, y, sigma })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }
}

/// Output of a single fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub parameters: Vec<f64>,
    /// Row-major, `param_count × param_count`, symmetric.
    pub covariance: Vec<Vec<f64>>,
    pub chi_square: f64,
    pub n_points: usize,
    pub iterations: usize,
}

impl FitResult {
    /// One-sigma parameter errors: `sqrt(diag(covariance))`.
    pub fn errors(&self) -> Vec<f64> {
        (0..self.parameters.len())
            .map(|i| self.covariance[i][i].sqrt())
            .collect()
    }

    /// Degrees of freedom `N − p` (zero when the fit is exactly determined).
    pub fn dof(&self) -> usize {
        self.n_points.saturating_sub(self.parameters.len())
    }

    pub fn reduced_chi_square(&self) -> Option<f64> {
        match self.dof() {
            0 => None,
            dof => Some(self.chi_square / dof as f64),
        }
    }
}

/// Serialized fit report (one file per fitted category).
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub model: ModelKind,
    pub parameter_names: Vec<String>,
    pub result: Vec<f64>,
    pub errors: Vec<f64>,
    pub unnormalized_result: Vec<f64>,
    pub unnormalized_errors: Vec<f64>,
    pub percentage_errors: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub chi2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    pub n_points: usize,
    pub generated_at: DateTime<Utc>,
}

/// One raw data point for plotting (unnormalized units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub y_err: f64,
    pub y_fit: f64,
    pub residual: f64,
}

/// One sample of the fitted curve on a dense grid (unnormalized units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y_fit: f64,
}

/// Series handed to an external plotting tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotData {
    /// Measured points with their fitted value and residual.
    pub points: Vec<PlotPoint>,
    /// Fitted curve over the measured x range.
    pub curve: Vec<CurvePoint>,
}

/// Column names of a correlation (CHSH) table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationSchema {
    pub alpha_column: String,
    pub beta_column: String,
    pub value_column: String,
    pub error_column: String,
}

impl Default for CorrelationSchema {
    fn default() -> Self {
        Self {
            alpha_column: "alpha".to_string(),
            beta_column: "beta".to_string(),
            value_column: "Mean Correlation".to_string(),
            error_column: "total deviation".to_string(),
        }
    }
}

/// Column names of a coherence (HBT) table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoherenceSchema {
    pub current_column: String,
    pub duration_column: String,
    pub name_column: String,
    pub value_column: String,
    pub error_column: String,
}

impl Default for CoherenceSchema {
    fn default() -> Self {
        Self {
            current_column: "Current".to_string(),
            duration_column: "duration in seconds".to_string(),
            name_column: "Measurement name".to_string(),
            value_column: "Mean value".to_string(),
            error_column: "total deviation".to_string(),
        }
    }
}

/// Polarizer angles of a standard transmission scan (degrees).
pub const DEFAULT_ALPHAS: [i64; 4] = [0, 45, 90, 135];

/// Initial phase guess (radians) when none is given for an alpha.
pub const DEFAULT_PHASE_GUESS: f64 = 3.0;

/// Initial wave-packet guess `[I, f, σ, φ]` in normalized, centred units.
pub const WAVE_PACKET_GUESS: [f64; 4] = [1.0, 1.0, 20.0, 1.0];

/// Initial transmission-law guess `[a, b, c, d]` for a normalized angle scan.
pub fn transmission_guess(phase: f64) -> [f64; 4] {
    [1.0, 1.0, PI / 4.0, phase]
}

/// Column holding the counts of polarizer angle `alpha`.
pub fn alpha_column(alpha: i64) -> String {
    format!("alpha={alpha}")
}

/// Configuration of a transmission-law run.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct TransmissionConfig {
    pub csv_path: PathBuf,
    pub output_dir: PathBuf,
    pub beta_column: String,
    /// Polarizer angles; each selects the column `alpha=<angle>`.
    pub alphas: Vec<i64>,
    /// Initial phase guess (radians) per alpha.
    pub phase_guesses: Vec<f64>,
}

impl TransmissionConfig {
    /// Phase guess for the `i`-th alpha; the last guess repeats when fewer are given.
    pub fn phase_guess(&self, i: usize) -> f64 {
        self.phase_guesses
            .get(i)
            .or(self.phase_guesses.last())
            .copied()
            .unwrap_or(DEFAULT_PHASE_GUESS)
    }
}

/// Configuration of a wave-packet run.
#[derive(Debug, Clone)]
pub struct WavePacketConfig {
    pub csv_path: PathBuf,
    pub output_dir: PathBuf,
    pub x_column: String,
    pub columns: Vec<String>,
    pub initial_guess: Vec<f64>,
}

/// Configuration of a CHSH run.
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    pub csv_path: PathBuf,
    pub schema: CorrelationSchema,
    pub output: Option<PathBuf>,
}

/// Configuration of an HBT run.
#[derive(Debug, Clone)]
pub struct CoherenceConfig {
    pub csv_path: PathBuf,
    pub output_dir: PathBuf,
    pub schema: CoherenceSchema,
}

/// Configuration of synthetic data generation.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub model: ModelKind,
    pub output: PathBuf,
    pub seed: u64,
    /// Peak count of the generated curve.
    pub peak_counts: f64,
    pub noise: bool,
}

/// A category whose computation failed.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFailure {
    pub category: String,
    pub error: AnalysisError,
}

impl fmt::Display for CategoryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: [Polarization; 4] = [
        Polarization::H,
        Polarization::V,
        Polarization::Plus,
        Polarization::Minus,
    ];

    #[test]
    fn orthogonal_is_an_involution() {
        for p in SETTINGS {
            assert_ne!(p, p.orthogonal());
            assert_eq!(p, p.orthogonal().orthogonal());
        }
    }

    #[test]
    fn polarization_labels_round_trip() {
        for p in SETTINGS {
            assert_eq!(p.label().parse::<Polarization>().unwrap(), p);
        }
        assert_eq!("P".parse::<Polarization>().unwrap(), Polarization::Plus);
        assert_eq!("\u{2212}".parse::<Polarization>().unwrap(), Polarization::Minus);
        assert!("X".parse::<Polarization>().is_err());
    }

    #[test]
    fn alpha_angles_map_to_settings() {
        assert_eq!(Polarization::from_alpha_degrees(0), Some(Polarization::H));
        assert_eq!(Polarization::from_alpha_degrees(45), Some(Polarization::Plus));
        assert_eq!(Polarization::from_alpha_degrees(90), Some(Polarization::V));
        assert_eq!(Polarization::from_alpha_degrees(135), Some(Polarization::Minus));
        assert_eq!(Polarization::from_alpha_degrees(30), None);
    }

    #[test]
    fn dataset_rejects_zero_sigma() {
        let err = FitDataset::new(vec![0.0, 1.0], vec![1.0, 2.0], vec![0.1, 0.0]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
        assert!(FitDataset::new(vec![0.0], vec![1.0, 2.0], vec![0.1, 0.1]).is_err());
    }

    #[test]
    fn bounds_clamp_into_box() {
        let b = ModelKind::TransmissionLaw.default_bounds();
        let mut p = [-1.0, 0.5, 100.0, 3.0];
        assert!(!b.contains(&p));
        b.clamp(&mut p);
        assert!(b.contains(&p));
        assert_eq!(p[0], 0.0);
        assert_eq!(p[2], 6.0 * PI);
    }

    #[test]
    fn phase_guesses_repeat_the_last_entry() {
        let mut cfg = TransmissionConfig {
            csv_path: PathBuf::from("scan.csv"),
            output_dir: PathBuf::from("out"),
            beta_column: "beta".into(),
            alphas: DEFAULT_ALPHAS.to_vec(),
            phase_guesses: vec![1.0, 2.0],
        };
        assert_eq!(cfg.phase_guess(0), 1.0);
        assert_eq!(cfg.phase_guess(3), 2.0);
        cfg.phase_guesses.clear();
        assert_eq!(cfg.phase_guess(1), DEFAULT_PHASE_GUESS);
        assert_eq!(alpha_column(45), "alpha=45");
    }

    #[test]
    fn model_metadata_is_consistent() {
        for m in [ModelKind::TransmissionLaw, ModelKind::WavePacket] {
            assert_eq!(m.param_names().len(), m.param_roles().len());
            assert_eq!(m.default_bounds().len(), m.param_count());
        }
    }
}
