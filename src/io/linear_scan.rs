//! Linear-scan instrument log to CSV.
//!
//! The counter writes one whitespace-separated line per scan position, with
//! `=`-ruled banners and `#` comments in between. The first six fields of a data
//! line are the stage position and the five coincidence channels.

use std::io::{BufRead, Write};

use tracing::debug;

use crate::error::AppError;

/// Header of the converted CSV.
pub const SCAN_HEADER: [&str; 6] = [
    "x",
    "coincidence 0",
    "coincidence 1",
    "coincidence 2",
    "coincidence 3",
    "coincidence 01",
];

/// Convert a scan log; returns the number of data rows written.
pub fn convert_linear_scan<R: BufRead, W: Write>(reader: R, writer: W) -> Result<usize, AppError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(SCAN_HEADER)
        .map_err(|e| AppError::new(2, format!("Failed to write scan CSV header: {e}")))?;

    let mut rows = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AppError::new(2, format!("Failed to read scan log line {}: {e}", idx + 1)))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('=') || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().take(SCAN_HEADER.len()).collect();
        if fields.len() < SCAN_HEADER.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Scan log line {} has {} fields, expected at least {}.",
                    idx + 1,
                    fields.len(),
                    SCAN_HEADER.len()
                ),
            ));
        }
        w.write_record(&fields)
            .map_err(|e| AppError::new(2, format!("Failed to write scan CSV row: {e}")))?;
        rows += 1;
    }

    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush scan CSV: {e}")))?;
    debug!(rows, "linear scan converted");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_banners_and_keeps_six_fields() {
        let log = "==========\n\
                   # position c0 c1 c2 c3 c01 temp\n\
                   \n\
                   0.000 10 12 9 11 3 21.5\n\
                   0.005\t14 13 10 12 4 21.6\n\
                   ==========\n";
        let mut out = Vec::new();
        let rows = convert_linear_scan(log.as_bytes(), &mut out).unwrap();
        assert_eq!(rows, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "x,coincidence 0,coincidence 1,coincidence 2,coincidence 3,coincidence 01",
                "0.000,10,12,9,11,3",
                "0.005,14,13,10,12,4",
            ]
        );
    }

    #[test]
    fn short_data_line_is_rejected() {
        let err = convert_linear_scan("1 2 3\n".as_bytes(), Vec::new()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn converted_output_loads_as_a_table() {
        let mut out = Vec::new();
        convert_linear_scan("0 1 2 3 4 5\n1 6 7 8 9 10\n".as_bytes(), &mut out).unwrap();
        let table = crate::io::read_table(out.as_slice()).unwrap();
        assert_eq!(table.numeric_column("coincidence 01").unwrap(), vec![5.0, 10.0]);
    }
}
