//! Input/output helpers.
//!
//! - CSV ingest into a `MeasurementTable` (`ingest`)
//! - report exports (JSON) and plot series (CSV) (`export`)
//! - instrument scan log conversion (`linear_scan`)

pub mod export;
pub mod ingest;
pub mod linear_scan;

pub use export::*;
pub use ingest::*;
pub use linear_scan::*;
