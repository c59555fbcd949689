//! Command-line parsing for the photon-coincidence analysis tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting and propagation code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ModelKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pqe", version, about = "Photon coincidence analysis: curve fits, CHSH and g2")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the transmission law to each `alpha=<N>` column of a polarizer scan.
    Transmission(TransmissionArgs),
    /// Fit the wave-packet model to interferometer scan columns.
    WavePacket(WavePacketArgs),
    /// Compute correlation values and the CHSH parameter from a correlation table.
    Chsh(ChshArgs),
    /// Compute g2 and heralded g2 for every (current, duration) category.
    Hbt(HbtArgs),
    /// Convert a linear-scan instrument log to CSV.
    ConvertScan(ConvertScanArgs),
    /// Write a synthetic scan with optional Poisson noise.
    Simulate(SimulateArgs),
}

/// Optimizer overrides shared by the fit commands.
#[derive(Debug, Args, Clone)]
pub struct FitTuningArgs {
    /// Iteration budget (default: 100 · (parameters + 1)).
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Treat errors as relative weights and rescale the covariance by chi2/dof.
    #[arg(long)]
    pub relative_sigma: bool,

    /// Do not write plot-data CSVs next to the reports.
    #[arg(long)]
    pub no_plot_data: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct TransmissionArgs {
    /// Polarizer scan CSV.
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    /// Directory for reports and plot data.
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Column holding the second polarizer angle (degrees).
    #[arg(long, default_value = "beta")]
    pub beta_column: String,

    /// Polarizer angles to fit; each reads the column `alpha=<angle>`.
    #[arg(long, value_delimiter = ',', default_values_t = [0, 45, 90, 135])]
    pub alphas: Vec<i64>,

    /// Initial phase guess (radians) per alpha, in the order of `--alphas`.
    #[arg(long = "phase-guess", value_delimiter = ',', default_values_t = [3.0])]
    pub phase_guesses: Vec<f64>,

    #[command(flatten)]
    pub tuning: FitTuningArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct WavePacketArgs {
    /// Interferometer scan CSV (e.g. from `convert-scan`).
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    /// Directory for reports and plot data.
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Stage position column.
    #[arg(long, default_value = "x")]
    pub x_column: String,

    /// Count column(s) to fit.
    #[arg(long = "column", default_values_t = ["coincidence 01".to_string()])]
    pub columns: Vec<String>,

    /// Initial guess `I,f,sigma,phi` in normalized, centred units.
    #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0, 20.0, 1.0])]
    pub guess: Vec<f64>,

    #[command(flatten)]
    pub tuning: FitTuningArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct ChshArgs {
    /// Correlation table CSV.
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    #[arg(long, default_value = "alpha")]
    pub alpha_column: String,

    #[arg(long, default_value = "beta")]
    pub beta_column: String,

    #[arg(long, default_value = "Mean Correlation")]
    pub value_column: String,

    #[arg(long, default_value = "total deviation")]
    pub error_column: String,

    /// Also write the result as JSON.
    #[arg(long, value_name = "JSON")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct HbtArgs {
    /// HBT count table CSV.
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    /// Directory for `hbt_measurements.json`.
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "Current")]
    pub current_column: String,

    #[arg(long, default_value = "duration in seconds")]
    pub duration_column: String,

    #[arg(long, default_value = "Measurement name")]
    pub name_column: String,

    #[arg(long, default_value = "Mean value")]
    pub value_column: String,

    #[arg(long, default_value = "total deviation")]
    pub error_column: String,
}

#[derive(Debug, Parser, Clone)]
pub struct ConvertScanArgs {
    /// Instrument log.
    #[arg(long, value_name = "LOG")]
    pub input: PathBuf,

    /// CSV to write (default: the log path with a `.csv` extension).
    #[arg(long, value_name = "CSV")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    #[arg(long, value_enum, default_value_t = ModelKind::TransmissionLaw)]
    pub model: ModelKind,

    /// CSV to write.
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    /// Random seed for the Poisson noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Count at the top of the generated curve.
    #[arg(long, default_value_t = 1000.0)]
    pub peak_counts: f64,

    /// Write the noise-free expectation instead of Poisson draws.
    #[arg(long)]
    pub no_noise: bool,
}
