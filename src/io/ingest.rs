//! CSV ingest into a `MeasurementTable`.
//!
//! Cells are parsed as numbers when possible and kept as text otherwise; no
//! schema is enforced here. Calculators validate the columns they need when
//! they query the table, so one loader serves every analysis.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::error::AppError;
use crate::table::{Cell, MeasurementTable};

/// Load a CSV file from disk.
pub fn load_table(path: &Path) -> Result<MeasurementTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let table = read_table(file)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))?;
    debug!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "table loaded"
    );
    Ok(table)
}

/// Read CSV from any reader; the first record is the header.
pub fn read_table<R: Read>(reader: R) -> Result<MeasurementTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?;
    let columns = header_names(headers);
    if columns.iter().all(|c| c.is_empty()) {
        return Err(AppError::new(2, "CSV has no header row."));
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header and CSV lines are 1-based.
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("CSV parse error on line {line}: {e}")))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(Cell::parse).collect());
    }

    MeasurementTable::new(columns, rows).map_err(AppError::from)
}

fn header_names(headers: &StringRecord) -> Vec<String> {
    headers.iter().map(normalize_header_name).collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    // Case is kept: lab column names ("Mean value", "N12") are case-sensitive.
    name.trim_start_matches('\u{feff}').trim().to_string()
}
