//! Curve fitting.
//!
//! Responsibilities:
//!
//! - preprocess raw count series into weighted, normalized datasets
//! - run the bounded weighted Levenberg–Marquardt fit
//! - map fit results back to raw units (see `report::fit` for the report record)

pub mod fitter;
pub mod preprocess;

pub use fitter::*;
pub use preprocess::*;
