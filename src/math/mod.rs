//! Mathematical utilities: small dense linear algebra and descriptive statistics.

pub mod linalg;
pub mod stats;

pub use linalg::*;
pub use stats::*;
