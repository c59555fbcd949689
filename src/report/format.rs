//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::derived::{ChshResult, CLASSICAL_BOUND, CoherenceMeasurement};
use crate::domain::{CategoryFailure, FitReport, FitResult};
use crate::uncertain::UncertainValue;

/// Summary of one fitted category.
pub fn format_fit_summary(label: &str, fit: &FitResult, report: &FitReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} fit: {label} ===\n", fit.model.display_name()));
    out.push_str(&format!(
        "Points: n={} | iterations={} | chi2={:.4}",
        fit.n_points, fit.iterations, fit.chi_square
    ));
    if let Some(red) = fit.reduced_chi_square() {
        out.push_str(&format!(" | chi2/dof={red:.4}"));
    }
    out.push('\n');
    if let Some(max) = report.max_value {
        out.push_str(&format!("Max value: {max}\n"));
    }

    out.push_str(
        format!(
            "{:<20} {:>14} {:>14} {:>16} {:>16} {:>8}\n",
            "parameter", "value", "error", "raw value", "raw error", "err %"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<20} {:-<14} {:-<14} {:-<16} {:-<16} {:-<8}\n",
            "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');
    for (i, name) in report.parameter_names.iter().enumerate() {
        out.push_str(
            format!(
                "{:<20} {:>14.6} {:>14.6} {:>16.6} {:>16.6} {:>8}\n",
                truncate(name, 20),
                report.result[i],
                report.errors[i],
                report.unnormalized_result[i],
                report.unnormalized_errors[i],
                fmt_pct(Some(report.percentage_errors[i]).filter(|v| v.is_finite())),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Correlation values and the Bell parameter.
pub fn format_chsh(res: &ChshResult) -> String {
    let mut out = String::new();

    out.push_str("=== CHSH ===\n");
    for term in &res.terms {
        let sign = if term.sign < 0.0 { '-' } else { '+' };
        out.push_str(&format!(
            "{sign} E({}, {}) = {} ({})\n",
            term.alpha,
            term.beta,
            fmt_uncertain(term.e),
            fmt_pct(term.e.percentage_error()),
        ));
    }
    out.push_str(&format!(
        "S = {} ({})\n",
        fmt_uncertain(res.s),
        fmt_pct(res.s.percentage_error())
    ));
    // n_sigma is signed against +2, so only S above the bound is a violation.
    match res.n_sigma {
        Some(n) if res.s.nominal() > CLASSICAL_BOUND => {
            out.push_str(&format!("Violation of S <= {CLASSICAL_BOUND}: {n:.2} sigma\n"));
        }
        Some(n) => out.push_str(&format!("No violation of S <= {CLASSICAL_BOUND} ({n:.2} sigma)\n")),
        None => out.push_str("S carries no uncertainty; significance undefined\n"),
    }

    out
}

/// Table of coherence measurements.
pub fn format_coherence(rows: &[CoherenceMeasurement]) -> String {
    let mut out = String::new();

    out.push_str(
        format!(
            "{:<12} {:>10} {:>14} {:>14} {:>8} {:>14} {:>14} {:>8}\n",
            "current", "duration", "g2", "g2 err", "err %", "g2h", "g2h err", "err %"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<12} {:-<10} {:-<14} {:-<14} {:-<8} {:-<14} {:-<14} {:-<8}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');
    for m in rows {
        out.push_str(
            format!(
                "{:<12} {:>10} {:>14.6e} {:>14.6e} {:>8} {:>14.6} {:>14.6} {:>8}\n",
                truncate(&m.current.to_string(), 12),
                m.duration,
                m.g2,
                m.g2_error,
                fmt_pct(m.g2_percentage_error),
                m.g2h,
                m.g2h_error,
                fmt_pct(m.g2h_percentage_error),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Failed categories, one per line.
pub fn format_failures(failures: &[CategoryFailure]) -> String {
    let mut out = format!("{} categor{} failed:\n", failures.len(), if failures.len() == 1 { "y" } else { "ies" });
    for f in failures {
        out.push_str(&format!("  - {f}\n"));
    }
    out
}

fn fmt_uncertain(v: UncertainValue) -> String {
    format!("{v:.6}")
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(p) => format!("{p:.2}%"),
        None => "n/a".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::{ChshTerm, violation_sigmas};
    use crate::domain::Polarization;
    use crate::error::AnalysisError;
    use crate::table::Cell;

    #[test]
    fn chsh_summary_reports_violation() {
        let e = UncertainValue::new(0.7, 0.01).unwrap();
        let s = UncertainValue::new(2.8, 0.02).unwrap();
        let res = ChshResult {
            terms: vec![ChshTerm {
                alpha: Polarization::H,
                beta: 22.5,
                sign: 1.0,
                e,
            }],
            s,
            n_sigma: Some(40.0),
        };
        let text = format_chsh(&res);
        assert!(text.contains("+ E(H, 22.5) = 0.700000+/-0.010000"));
        assert!(text.contains("S = 2.800000+/-0.020000"));
        assert!(text.contains("Violation of S <= 2: 40.00 sigma"));
        assert!(text.starts_with("=== CHSH ===\n"));
    }

    #[test]
    fn negative_s_is_not_reported_as_a_violation() {
        let s = UncertainValue::new(-2.8, 0.02).unwrap();
        let res = ChshResult {
            terms: Vec::new(),
            s,
            n_sigma: violation_sigmas(s),
        };
        let text = format_chsh(&res);
        assert!(text.contains("No violation of S <= 2 (-240.00 sigma)"), "{text}");
        assert!(!text.contains("Violation of"));
    }

    #[test]
    fn coherence_table_has_a_row_per_measurement() {
        let rows = vec![CoherenceMeasurement {
            current: Cell::Number(1.5),
            duration: 10.0,
            g2: 2e-6,
            g2_error: 1e-7,
            g2_percentage_error: Some(5.0),
            g2h: 0.5,
            g2h_error: 0.1,
            g2h_percentage_error: None,
        }];
        let text = format_coherence(&rows);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().starts_with("1.5"));
        assert!(text.contains("5.00%"));
        assert!(text.contains("n/a"));
    }

    #[test]
    fn failures_are_listed() {
        let failures = vec![CategoryFailure {
            category: "alpha=45".into(),
            error: AnalysisError::TrimmingDegenerate,
        }];
        let text = format_failures(&failures);
        assert!(text.starts_with("1 category failed:"));
        assert!(text.contains("alpha=45"));
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("N12", 5), "N12");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }
}
