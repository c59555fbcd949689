//! Derived quantities built from keyed table lookups.
//!
//! - correlation `E(α, β)` and the CHSH/Bell parameter `S` (`correlation`)
//! - second-order coherence `g2` and heralded `g2h` (`coherence`)
//!
//! Every formula assumes its lookups are statistically independent
//! measurements (distinct table rows); see each function for details.

pub mod coherence;
pub mod correlation;

pub use coherence::*;
pub use correlation::*;
