//! `pqe-analysis` library crate.
//!
//! The binary (`pqe`) is a thin wrapper around this library so that:
//!
//! - the fitting and propagation core is testable without spawning processes
//! - lab notebooks or other front-ends can reuse the same pipelines
//!
//! Layout:
//!
//! - `uncertain`: values with standard deviations and error propagation
//! - `models`, `fit`: model catalogue, preprocessing and the bounded weighted fitter
//! - `table`, `derived`: keyed measurement tables, CHSH and g2 calculators
//! - `io`, `report`, `data`: CSV/JSON glue, summaries, synthetic scans

pub mod app;
pub mod cli;
pub mod data;
pub mod derived;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod table;
pub mod uncertain;
