//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the model catalogue and its parameter metadata (`ModelKind`, `ParamRole`, `Bounds`)
//! - polarization settings (`Polarization`)
//! - fit inputs/outputs (`FitDataset`, `FitResult`, `FitReport`, `PlotData`)
//! - table schemas and run configurations

pub mod types;

pub use types::*;
