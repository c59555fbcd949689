//! Error types.
//!
//! - `AnalysisError`: failures of the numerical core (lookups, fits, arithmetic).
//! - `AppError`: process-level error carrying the exit code used by `pqe`.

use thiserror::Error;

/// A failure inside the analysis core.
///
/// Every variant is fatal to the category being processed (one alpha column,
/// one current/duration pair, ...). None of them are retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// A categorical key matched no row of the table.
    #[error("measurement not found: {key}")]
    MeasurementNotFound { key: String },

    /// A categorical key matched more than one row of the table.
    #[error("ambiguous measurement: {key} matched {count} rows")]
    AmbiguousMeasurement { key: String, count: usize },

    /// The optimizer could not produce a parameter estimate.
    #[error("fit did not converge: {reason}")]
    ConvergenceFailure { reason: String },

    /// The Jacobian at the optimum is rank-deficient.
    #[error("covariance cannot be estimated: {reason}")]
    DegenerateCovariance { reason: String },

    /// Uncertainty propagation through a zero denominator.
    #[error("division by zero: denominator {denominator} has nominal value 0")]
    DivisionByZero { denominator: String },

    /// Outlier-window trimming selected no points.
    #[error("outlier-window trimming selected no points (no value deviates more than one std from the mean)")]
    TrimmingDegenerate,

    /// A column required by the current analysis is not in the table.
    #[error("missing column `{0}`")]
    MissingColumn(String),

    /// A cell that must be numeric holds something else.
    #[error("non-numeric value in column `{column}` (row {row})")]
    NonNumericCell { column: String, row: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    /// Exit code used when this error terminates the process.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::MissingColumn(_) | AnalysisError::InvalidInput(_) => 2,
            AnalysisError::MeasurementNotFound { .. }
            | AnalysisError::AmbiguousMeasurement { .. }
            | AnalysisError::NonNumericCell { .. }
            | AnalysisError::TrimmingDegenerate => 3,
            AnalysisError::ConvergenceFailure { .. }
            | AnalysisError::DegenerateCovariance { .. }
            | AnalysisError::DivisionByZero { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
