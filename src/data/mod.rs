//! Data sources other than lab CSV files.

pub mod sample;

pub use sample::*;
