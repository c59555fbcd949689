//! Row-oriented measurement tables and keyed lookups.

pub mod measurement;

pub use measurement::*;
