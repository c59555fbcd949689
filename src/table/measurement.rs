//! `MeasurementTable`: an ordered, read-only set of rows with named columns.
//!
//! Calculators query the table with a conjunction of `(column, key)` predicates.
//! A query that must identify one measurement goes through `find_unique`, which
//! treats zero matches and several matches as distinct errors instead of
//! picking one.

use std::fmt;

use serde::Serialize;

use crate::domain::Polarization;
use crate::error::AnalysisError;
use crate::uncertain::UncertainValue;

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Parse a raw field: numeric when it parses as `f64`, text otherwise.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Cell::Empty;
        }
        match s.parse::<f64>() {
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(s.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Key matching this exact cell value.
    pub fn as_key(&self) -> Option<Key<'_>> {
        match self {
            Cell::Number(v) => Some(Key::Number(*v)),
            Cell::Text(s) => Some(Key::Text(s)),
            Cell::Empty => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Empty => Ok(()),
        }
    }
}

/// Value a column is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Key<'a> {
    Number(f64),
    Text(&'a str),
    /// Matches text cells whose label parses to this setting (`+` and `P` alike).
    Polarization(Polarization),
}

impl Key<'_> {
    fn matches(&self, cell: &Cell) -> bool {
        match (self, cell) {
            (Key::Number(k), Cell::Number(v)) => k == v,
            (Key::Text(k), Cell::Text(v)) => k.trim() == v,
            (Key::Polarization(k), Cell::Text(v)) => v.parse::<Polarization>().ok() == Some(*k),
            _ => false,
        }
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(v) => write!(f, "{v}"),
            Key::Text(s) => f.write_str(s),
            Key::Polarization(p) => write!(f, "{p}"),
        }
    }
}

/// One `column == key` predicate.
pub type Predicate<'a> = (&'a str, Key<'a>);

/// Row-oriented dataset loaded once and queried read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl MeasurementTable {
    /// Build a table. Short rows are padded with `Cell::Empty`; long rows are an error.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, AnalysisError> {
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(AnalysisError::InvalidInput(format!(
                    "row {i} has {} fields but the header has {width}",
                    row.len()
                )));
            }
            row.resize(width, Cell::Empty);
            padded.push(row);
        }
        Ok(Self { columns, rows: padded })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, AnalysisError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))
    }

    pub fn cell(&self, row: usize, column: &str) -> Result<&Cell, AnalysisError> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|r| &r[idx])
            .ok_or_else(|| AnalysisError::InvalidInput(format!("row {row} out of range")))
    }

    /// Every value of a numeric column, in row order.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, AnalysisError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                cells[idx].as_f64().ok_or_else(|| AnalysisError::NonNumericCell {
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }

    /// Distinct non-empty values of a column in first-seen order.
    pub fn unique_values(&self, name: &str) -> Result<Vec<Cell>, AnalysisError> {
        let idx = self.column_index(name)?;
        let mut out: Vec<Cell> = Vec::new();
        for row in &self.rows {
            let cell = &row[idx];
            if *cell != Cell::Empty && !out.contains(cell) {
                out.push(cell.clone());
            }
        }
        Ok(out)
    }

    /// Rows matching every predicate, as a new table with the same columns.
    pub fn select(&self, predicates: &[Predicate<'_>]) -> Result<MeasurementTable, AnalysisError> {
        let idx = self.predicate_indices(predicates)?;
        let rows = self
            .rows
            .iter()
            .filter(|row| row_matches(row, &idx, predicates))
            .cloned()
            .collect();
        Ok(MeasurementTable {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Index of the single row matching every predicate.
    pub fn find_unique(&self, predicates: &[Predicate<'_>]) -> Result<usize, AnalysisError> {
        let idx = self.predicate_indices(predicates)?;
        let matches: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row_matches(row, &idx, predicates))
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [one] => Ok(*one),
            [] => Err(AnalysisError::MeasurementNotFound {
                key: describe(predicates),
            }),
            many => Err(AnalysisError::AmbiguousMeasurement {
                key: describe(predicates),
                count: many.len(),
            }),
        }
    }

    /// Read `(value_column, error_column)` of one row as an `UncertainValue`.
    pub fn uncertain_value(
        &self,
        row: usize,
        value_column: &str,
        error_column: &str,
    ) -> Result<UncertainValue, AnalysisError> {
        let nominal = self.numeric_cell(row, value_column)?;
        let stddev = self.numeric_cell(row, error_column)?;
        UncertainValue::new(nominal, stddev)
    }

    /// `find_unique` followed by `uncertain_value`.
    pub fn lookup(
        &self,
        predicates: &[Predicate<'_>],
        value_column: &str,
        error_column: &str,
    ) -> Result<UncertainValue, AnalysisError> {
        let row = self.find_unique(predicates)?;
        self.uncertain_value(row, value_column, error_column)
    }

    fn numeric_cell(&self, row: usize, column: &str) -> Result<f64, AnalysisError> {
        self.cell(row, column)?
            .as_f64()
            .ok_or_else(|| AnalysisError::NonNumericCell {
                column: column.to_string(),
                row,
            })
    }

    fn predicate_indices(&self, predicates: &[Predicate<'_>]) -> Result<Vec<usize>, AnalysisError> {
        predicates.iter().map(|(col, _)| self.column_index(col)).collect()
    }
}

fn row_matches(row: &[Cell], idx: &[usize], predicates: &[Predicate<'_>]) -> bool {
    idx.iter()
        .zip(predicates.iter())
        .all(|(&i, (_, key))| key.matches(&row[i]))
}

fn describe(predicates: &[Predicate<'_>]) -> String {
    predicates
        .iter()
        .map(|(col, key)| format!("{col}={key}"))
        .collect::<Vec<_>>()
        .join(", ")
}
