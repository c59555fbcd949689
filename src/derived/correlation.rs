//! Polarization correlation `E(α, β)` and the CHSH parameter.
//!
//! ```text
//! E(α, β) = (C(α,β) + C(α⊥,β⊥) − C(α⊥,β) − C(α,β⊥))
//!         / (C(α,β) + C(α⊥,β⊥) + C(α⊥,β) + C(α,β⊥))
//!
//! S = E(H, 22.5°) + E(+, 22.5°) − E(H, 67.5°) + E(+, 67.5°)
//! ```
//!
//! with `α⊥ = α.orthogonal()` and `β⊥ = β + 90°`.

use serde::Serialize;
use tracing::debug;

use crate::domain::{CorrelationSchema, Polarization};
use crate::error::AnalysisError;
use crate::table::{Key, MeasurementTable};
use crate::uncertain::UncertainValue;

/// Local-realist bound on `|S|`.
pub const CLASSICAL_BOUND: f64 = 2.0;

/// `(α, β in degrees, sign)` of the four CHSH terms.
pub const CHSH_TERMS: [(Polarization, f64, f64); 4] = [
    (Polarization::H, 22.5, 1.0),
    (Polarization::Plus, 22.5, 1.0),
    (Polarization::H, 67.5, -1.0),
    (Polarization::Plus, 67.5, 1.0),
];

/// Orthogonal setting of the second analyzer (degrees).
pub fn beta_perp(beta: f64) -> f64 {
    beta + 90.0
}

/// Coincidence rate `C(α, β)`: the single row with this `(alpha, beta)`.
pub fn coincidence(
    table: &MeasurementTable,
    schema: &CorrelationSchema,
    alpha: Polarization,
    beta: f64,
) -> Result<UncertainValue, AnalysisError> {
    table.lookup(
        &[
            (schema.alpha_column.as_str(), Key::Polarization(alpha)),
            (schema.beta_column.as_str(), Key::Number(beta)),
        ],
        &schema.value_column,
        &schema.error_column,
    )
}

/// Correlation value `E(α, β)`.
///
/// Precondition: the four coincidence rates are independent measurements
/// (four distinct rows). Numerator and denominator share those rates, and the
/// propagation here treats the two sums independently; the reported stddev is
/// therefore the independent-operand estimate.
pub fn correlation(
    table: &MeasurementTable,
    schema: &CorrelationSchema,
    alpha: Polarization,
    beta: f64,
) -> Result<UncertainValue, AnalysisError> {
    let c_ab = coincidence(table, schema, alpha, beta)?;
    let c_perp_perp = coincidence(table, schema, alpha.orthogonal(), beta_perp(beta))?;
    let c_perp_b = coincidence(table, schema, alpha.orthogonal(), beta)?;
    let c_a_perp = coincidence(table, schema, alpha, beta_perp(beta))?;

    let numerator = c_ab + c_perp_perp - c_perp_b - c_a_perp;
    let denominator = c_ab + c_perp_perp + c_perp_b + c_a_perp;
    let e = numerator.checked_div(denominator)?;
    debug!(%alpha, beta, e = %e, "correlation");
    Ok(e)
}

/// One evaluated CHSH term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChshTerm {
    pub alpha: Polarization,
    pub beta: f64,
    pub sign: f64,
    pub e: UncertainValue,
}

/// The Bell parameter with its terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChshResult {
    pub terms: Vec<ChshTerm>,
    pub s: UncertainValue,
    /// `(S − 2) / σ_S`; `None` when `S` carries no uncertainty.
    pub n_sigma: Option<f64>,
}

/// Evaluate `S` from the four correlation values.
///
/// Precondition: the four `E` terms are built from disjoint row sets, so they
/// may be summed as independent values.
pub fn chsh(table: &MeasurementTable, schema: &CorrelationSchema) -> Result<ChshResult, AnalysisError> {
    let mut terms = Vec::with_capacity(CHSH_TERMS.len());
    let mut s = UncertainValue::exact(0.0);
    for (alpha, beta, sign) in CHSH_TERMS {
        let e = correlation(table, schema, alpha, beta)?;
        s = if sign < 0.0 { s - e } else { s + e };
        terms.push(ChshTerm { alpha, beta, sign, e });
    }
    Ok(ChshResult {
        terms,
        s,
        n_sigma: violation_sigmas(s),
    })
}

/// Standard deviations by which `S` exceeds the classical bound.
pub fn violation_sigmas(s: UncertainValue) -> Option<f64> {
    if s.stddev() > 0.0 {
        Some((s.nominal() - CLASSICAL_BOUND) / s.stddev())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn schema() -> CorrelationSchema {
        CorrelationSchema::default()
    }

    fn table_from(rows: &[(&str, f64, f64, f64)]) -> MeasurementTable {
        let s = schema();
        let columns = vec![s.alpha_column, s.beta_column, s.value_column, s.error_column];
        let rows = rows
            .iter()
            .map(|(a, b, v, e)| vec![Cell::parse(a), Cell::Number(*b), Cell::Number(*v), Cell::Number(*e)])
            .collect();
        MeasurementTable::new(columns, rows).unwrap()
    }

    fn alpha_degrees(p: Polarization) -> f64 {
        match p {
            Polarization::H => 0.0,
            Polarization::Plus => 45.0,
            Polarization::V => 90.0,
            Polarization::Minus => 135.0,
        }
    }

    /// Ideal entangled-state rates `C = N cos²(β − α)`.
    fn ideal_table() -> MeasurementTable {
        let mut rows = Vec::new();
        let labels = [("H", Polarization::H), ("V", Polarization::V), ("+", Polarization::Plus), ("-", Polarization::Minus)];
        for (label, p) in labels {
            for beta in [22.5, 67.5, 112.5, 157.5] {
                let c = 1000.0 * (beta - alpha_degrees(p)).to_radians().cos().powi(2);
                rows.push((label, beta, c, 1.0));
            }
        }
        table_from(&rows)
    }

    #[test]
    fn perfect_correlation_gives_e_of_one() {
        let t = table_from(&[
            ("H", 0.0, 10.0, 1.0),
            ("V", 90.0, 10.0, 1.0),
            ("V", 0.0, 0.0, 1.0),
            ("H", 90.0, 0.0, 1.0),
        ]);
        let e = correlation(&t, &schema(), Polarization::H, 0.0).unwrap();
        assert!((e.nominal() - 1.0).abs() < 1e-12);
        assert!(e.stddev() > 0.0);
    }

    #[test]
    fn missing_orthogonal_row_is_not_found() {
        let t = table_from(&[("H", 0.0, 10.0, 1.0), ("V", 90.0, 10.0, 1.0), ("V", 0.0, 0.0, 1.0)]);
        let err = correlation(&t, &schema(), Polarization::H, 0.0).unwrap_err();
        assert!(matches!(err, AnalysisError::MeasurementNotFound { .. }));
    }

    #[test]
    fn all_zero_rates_fail_on_division() {
        let t = table_from(&[
            ("H", 0.0, 0.0, 1.0),
            ("V", 90.0, 0.0, 1.0),
            ("V", 0.0, 0.0, 1.0),
            ("H", 90.0, 0.0, 1.0),
        ]);
        let err = correlation(&t, &schema(), Polarization::H, 0.0).unwrap_err();
        assert!(matches!(err, AnalysisError::DivisionByZero { .. }));
    }

    #[test]
    fn ideal_state_reaches_tsirelson_bound() {
        let res = chsh(&ideal_table(), &schema()).unwrap();
        assert_eq!(res.terms.len(), 4);
        assert!((res.s.nominal() - 2.0 * 2f64.sqrt()).abs() < 1e-9, "S = {}", res.s);
        let expected_sigma = (res.s.nominal() - 2.0) / res.s.stddev();
        assert_eq!(res.n_sigma, Some(expected_sigma));
        assert!(expected_sigma > 0.0);
        assert!((res.terms[2].e.nominal() + 0.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn s_stddev_is_quadrature_of_terms() {
        let res = chsh(&ideal_table(), &schema()).unwrap();
        let var: f64 = res.terms.iter().map(|t| t.e.stddev().powi(2)).sum();
        assert!((res.s.stddev() - var.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn exact_s_has_no_sigma_count() {
        assert_eq!(violation_sigmas(UncertainValue::exact(2.5)), None);
    }
}
