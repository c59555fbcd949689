//! Report exports: pretty JSON for reports, CSV for plot series.
//!
//! The plot CSVs are meant to be easy to consume in spreadsheets or an external
//! plotting script.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::PlotData;
use crate::error::AppError;

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create JSON '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON '{}': {e}", path.display())))?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| AppError::new(2, format!("Failed to write JSON '{}': {e}", path.display())))
}

/// Write the measured points (`x,y,y_err,y_fit,residual`) as CSV.
pub fn write_points_csv<W: Write>(writer: W, plot: &PlotData) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    for p in &plot.points {
        w.serialize(p)
            .map_err(|e| AppError::new(2, format!("Failed to write plot CSV row: {e}")))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush plot CSV: {e}")))
}

/// Write the fitted curve (`x,y_fit`) as CSV.
pub fn write_curve_csv<W: Write>(writer: W, plot: &PlotData) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    for c in &plot.curve {
        w.serialize(c)
            .map_err(|e| AppError::new(2, format!("Failed to write curve CSV row: {e}")))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush curve CSV: {e}")))
}

/// Write `<stem>_points.csv` and `<stem>_curve.csv` next to a report.
///
/// Returns the two paths written.
pub fn write_plot_files(dir: &Path, stem: &str, plot: &PlotData) -> Result<(PathBuf, PathBuf), AppError> {
    let points_path = dir.join(format!("{stem}_points.csv"));
    let curve_path = dir.join(format!("{stem}_curve.csv"));
    ensure_parent(&points_path)?;

    let file = File::create(&points_path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", points_path.display())))?;
    write_points_csv(file, plot)?;

    let file = File::create(&curve_path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", curve_path.display())))?;
    write_curve_csv(file, plot)?;

    Ok((points_path, curve_path))
}

/// File-name friendly form of a column or category label.
pub fn file_stem(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", dir.display()))),
        _ => Ok(()),
    }
}
