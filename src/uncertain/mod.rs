//! Values with a standard deviation and first-order error propagation.
//!
//! Every binary operation assumes its operands are statistically independent.
//! The type cannot check that; formulas that combine measurements document it
//! as a precondition on their inputs.

pub mod value;

pub use value::*;
