//! `UncertainValue`: a nominal value plus a standard deviation.
//!
//! Propagation rules:
//!
//! ```text
//! a ± b : σ = sqrt(σa² + σb²)
//! a · b : σ = |a·b| · sqrt((σa/a)² + (σb/b)²)      (relative variances add)
//! a / b : σ = |a/b| · sqrt((σa/a)² + (σb/b)²)
//! k · a : σ = |k| · σa
//! ```
//!
//! When a nominal value entering `·` or `/` is exactly zero the relative form is
//! undefined and the linear form `σ² = Σ (∂f/∂x_i · σ_i)²` is used instead. Only
//! the exact-zero case switches; near-zero values keep the relative form.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use serde::Serialize;

use crate::error::AnalysisError;

/// A measured quantity with its standard deviation.
///
/// Values are immutable; arithmetic returns new instances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UncertainValue {
    nominal: f64,
    stddev: f64,
}

impl UncertainValue {
    /// Build a value from a measurement row.
    ///
    /// Fails when either number is non-finite or `stddev` is negative.
    pub fn new(nominal: f64, stddev: f64) -> Result<Self, AnalysisError> {
        if !nominal.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "nominal value must be finite, got {nominal}"
            )));
        }
        if !(stddev.is_finite() && stddev >= 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "standard deviation must be finite and >= 0, got {stddev}"
            )));
        }
        Ok(Self { nominal, stddev })
    }

    /// A value known without uncertainty.
    pub fn exact(nominal: f64) -> Self {
        Self {
            nominal,
            stddev: 0.0,
        }
    }

    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    /// `stddev / |nominal|`, or `None` when the nominal value is zero.
    pub fn relative_error(&self) -> Option<f64> {
        if self.nominal == 0.0 {
            None
        } else {
            Some(self.stddev / self.nominal.abs())
        }
    }

    /// Relative error in percent.
    pub fn percentage_error(&self) -> Option<f64> {
        self.relative_error().map(|r| r * 100.0)
    }

    /// Multiply by a deterministic scalar.
    pub fn scale(self, k: f64) -> Self {
        Self {
            nominal: self.nominal * k,
            stddev: k.abs() * self.stddev,
        }
    }

    /// Divide, failing when the denominator's nominal value is exactly zero.
    pub fn checked_div(self, rhs: Self) -> Result<Self, AnalysisError> {
        if rhs.nominal == 0.0 {
            return Err(AnalysisError::DivisionByZero {
                denominator: rhs.to_string(),
            });
        }
        let nominal = self.nominal / rhs.nominal;
        let stddev = if self.nominal == 0.0 {
            let da = self.stddev / rhs.nominal;
            let db = self.nominal * rhs.stddev / (rhs.nominal * rhs.nominal);
            (da * da + db * db).sqrt()
        } else {
            let ra = self.stddev / self.nominal;
            let rb = rhs.stddev / rhs.nominal;
            nominal.abs() * (ra * ra + rb * rb).sqrt()
        };
        Ok(Self { nominal, stddev })
    }
}

impl Add for UncertainValue {
    type Output = UncertainValue;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            nominal: self.nominal + rhs.nominal,
            stddev: (self.stddev * self.stddev + rhs.stddev * rhs.stddev).sqrt(),
        }
    }
}

impl Sub for UncertainValue {
    type Output = UncertainValue;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            nominal: self.nominal - rhs.nominal,
            stddev: (self.stddev * self.stddev + rhs.stddev * rhs.stddev).sqrt(),
        }
    }
}

impl Mul for UncertainValue {
    type Output = UncertainValue;

    fn mul(self, rhs: Self) -> Self::Output {
        let nominal = self.nominal * rhs.nominal;
        let stddev = if self.nominal == 0.0 || rhs.nominal == 0.0 {
            let da = rhs.nominal * self.stddev;
            let db = self.nominal * rhs.stddev;
            (da * da + db * db).sqrt()
        } else {
            let ra = self.stddev / self.nominal;
            let rb = rhs.stddev / rhs.nominal;
            nominal.abs() * (ra * ra + rb * rb).sqrt()
        };
        Self { nominal, stddev }
    }
}

impl Mul<f64> for UncertainValue {
    type Output = UncertainValue;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scale(rhs)
    }
}

impl Neg for UncertainValue {
    type Output = UncertainValue;

    fn neg(self) -> Self::Output {
        Self {
            nominal: -self.nominal,
            stddev: self.stddev,
        }
    }
}

impl fmt::Display for UncertainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "{:.*}+/-{:.*}", p, self.nominal, p, self.stddev),
            None => write!(f, "{}+/-{}", self.nominal, self.stddev),
        }
    }
}
