//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments into run configurations
//! - runs the analysis pipelines
//! - prints summaries and writes reports

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{
    ChshArgs, Command, ConvertScanArgs, FitTuningArgs, HbtArgs, SimulateArgs, TransmissionArgs, WavePacketArgs,
};
use crate::derived::{ChshResult, CoherenceMeasurement};
use crate::domain::{
    CategoryFailure, CoherenceConfig, CoherenceSchema, CorrelationConfig, CorrelationSchema, SimulateConfig,
    TransmissionConfig, WavePacketConfig,
};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::io::{file_stem, load_table, write_json, write_plot_files};

pub mod pipeline;

use pipeline::{FittedColumn, Outcome};

/// Entry point for the `pqe` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Transmission(args) => handle_transmission(&args),
        Command::WavePacket(args) => handle_wave_packet(&args),
        Command::Chsh(args) => handle_chsh(&args),
        Command::Hbt(args) => handle_hbt(&args),
        Command::ConvertScan(args) => handle_convert_scan(&args),
        Command::Simulate(args) => handle_simulate(&args),
    }
}

/// Log to stderr so stdout carries only reports. `RUST_LOG` overrides the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// What to write per fitted column.
#[derive(Debug, Clone, Copy)]
struct FitOutputs {
    plot_data: bool,
    /// Report file is `<name>_<suffix>.json`.
    report_suffix: &'static str,
}

fn handle_transmission(args: &TransmissionArgs) -> Result<(), AppError> {
    let config = transmission_config_from_args(args);
    let fit_opts = fit_options_from_args(&args.tuning);
    let table = load_table(&config.csv_path)?;

    let outcome = pipeline::run_transmission(&table, &config, &fit_opts)?;
    let outputs = FitOutputs {
        plot_data: !args.tuning.no_plot_data,
        report_suffix: "results",
    };
    write_fit_outputs(&outcome, &config.output_dir, outputs, |column| {
        let alpha = column.trim_start_matches("alpha=");
        format!("alpha_beta_fit_{alpha}")
    })?;
    finish(&outcome.failures)
}

fn handle_wave_packet(args: &WavePacketArgs) -> Result<(), AppError> {
    let config = wave_packet_config_from_args(args);
    let fit_opts = fit_options_from_args(&args.tuning);
    let table = load_table(&config.csv_path)?;

    let outcome = pipeline::run_wave_packet(&table, &config, &fit_opts)?;
    let stem = csv_stem(&config.csv_path);
    let outputs = FitOutputs {
        plot_data: !args.tuning.no_plot_data,
        report_suffix: "res",
    };
    write_fit_outputs(&outcome, &config.output_dir, outputs, |column| {
        format!("{stem}_{}", file_stem(column))
    })?;
    finish(&outcome.failures)
}

/// Print and persist each fitted column.
fn write_fit_outputs(
    outcome: &Outcome<FittedColumn>,
    output_dir: &Path,
    outputs: FitOutputs,
    name: impl Fn(&str) -> String,
) -> Result<(), AppError> {
    for (column, fitted) in &outcome.successes {
        println!("{}", crate::report::format_fit_summary(column, &fitted.fit, &fitted.report));

        let base = name(column);
        let path = output_dir.join(format!("{base}_{}.json", outputs.report_suffix));
        write_json(&path, &fitted.report)?;
        info!(path = %path.display(), "fit report written");

        if outputs.plot_data {
            let (points, curve) = write_plot_files(output_dir, &base, &fitted.plot)?;
            info!(points = %points.display(), curve = %curve.display(), "plot data written");
        }
    }
    Ok(())
}

fn handle_chsh(args: &ChshArgs) -> Result<(), AppError> {
    let config = correlation_config_from_args(args);
    let table = load_table(&config.csv_path)?;
    let result: ChshResult = pipeline::run_chsh(&table, &config.schema)?;

    println!("{}", crate::report::format_chsh(&result));
    if let Some(path) = &config.output {
        write_json(path, &result)?;
        info!(path = %path.display(), "CHSH report written");
    }
    Ok(())
}

/// `hbt_measurements.json` layout.
#[derive(Debug, Serialize)]
struct HbtReport<'a> {
    measurements: Vec<&'a CoherenceMeasurement>,
}

fn handle_hbt(args: &HbtArgs) -> Result<(), AppError> {
    let config = coherence_config_from_args(args);
    let table = load_table(&config.csv_path)?;
    let outcome = pipeline::run_coherence(&table, &config.schema)?;

    let rows: Vec<CoherenceMeasurement> = outcome.successes.iter().map(|(_, m)| m.clone()).collect();
    println!("{}", crate::report::format_coherence(&rows));

    let report = HbtReport {
        measurements: rows.iter().collect(),
    };
    let path = config.output_dir.join("hbt_measurements.json");
    write_json(&path, &report)?;
    info!(path = %path.display(), measurements = rows.len(), "HBT report written");

    finish(&outcome.failures)
}

fn handle_convert_scan(args: &ConvertScanArgs) -> Result<(), AppError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("csv"));
    if output == args.input {
        return Err(AppError::new(2, "Output path would overwrite the scan log."));
    }

    let input = File::open(&args.input)
        .map_err(|e| AppError::new(2, format!("Failed to open scan log '{}': {e}", args.input.display())))?;
    let out = File::create(&output)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", output.display())))?;
    let rows = crate::io::convert_linear_scan(BufReader::new(input), BufWriter::new(out))?;
    info!(rows, output = %output.display(), "scan converted");
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let config = simulate_config_from_args(args);
    let scan = crate::data::generate_scan(&config)?;
    let out = File::create(&config.output)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", config.output.display())))?;
    crate::data::write_scan_csv(BufWriter::new(out), &scan)?;
    info!(
        model = config.model.display_name(),
        rows = scan.rows.len(),
        seed = config.seed,
        output = %config.output.display(),
        "synthetic scan written"
    );
    Ok(())
}

/// Exit non-zero when any category failed, after everything else was written.
fn finish(failures: &[CategoryFailure]) -> Result<(), AppError> {
    let Some(first) = failures.first() else {
        return Ok(());
    };
    eprint!("{}", crate::report::format_failures(failures));
    warn!(failed = failures.len(), "run finished with failed categories");
    Err(AppError::new(
        first.error.exit_code(),
        format!("{} categories failed; first: {first}", failures.len()),
    ))
}

fn csv_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| file_stem(&s.to_string_lossy()))
        .unwrap_or_else(|| "scan".to_string())
}

pub fn fit_options_from_args(args: &FitTuningArgs) -> FitOptions {
    FitOptions {
        max_iterations: args.max_iterations,
        absolute_sigma: !args.relative_sigma,
        ..FitOptions::default()
    }
}

pub fn transmission_config_from_args(args: &TransmissionArgs) -> TransmissionConfig {
    TransmissionConfig {
        csv_path: args.csv.clone(),
        output_dir: args.output_dir.clone(),
        beta_column: args.beta_column.clone(),
        alphas: args.alphas.clone(),
        phase_guesses: args.phase_guesses.clone(),
    }
}

pub fn wave_packet_config_from_args(args: &WavePacketArgs) -> WavePacketConfig {
    WavePacketConfig {
        csv_path: args.csv.clone(),
        output_dir: args.output_dir.clone(),
        x_column: args.x_column.clone(),
        columns: args.columns.clone(),
        initial_guess: args.guess.clone(),
    }
}

pub fn correlation_config_from_args(args: &ChshArgs) -> CorrelationConfig {
    CorrelationConfig {
        csv_path: args.csv.clone(),
        schema: CorrelationSchema {
            alpha_column: args.alpha_column.clone(),
            beta_column: args.beta_column.clone(),
            value_column: args.value_column.clone(),
            error_column: args.error_column.clone(),
        },
        output: args.output.clone(),
    }
}

pub fn coherence_config_from_args(args: &HbtArgs) -> CoherenceConfig {
    CoherenceConfig {
        csv_path: args.csv.clone(),
        output_dir: args.output_dir.clone(),
        schema: CoherenceSchema {
            current_column: args.current_column.clone(),
            duration_column: args.duration_column.clone(),
            name_column: args.name_column.clone(),
            value_column: args.value_column.clone(),
            error_column: args.error_column.clone(),
        },
    }
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        model: args.model,
        output: args.output.clone(),
        seed: args.seed,
        peak_counts: args.peak_counts,
        noise: !args.no_noise,
    }
}
