//! Second-order coherence from HBT count tables.
//!
//! For one `(current, duration)` pair the table holds named singles and
//! coincidence counts (`Measurement name` column):
//!
//! ```text
//! g2  = N12 / (N1 · N2 · T)            T = duration in seconds (exact)
//! g2h = (N0 · N012) / (N01 · N02)      heralded on detector 0
//! ```

use serde::Serialize;
use tracing::debug;

use crate::domain::CoherenceSchema;
use crate::error::AnalysisError;
use crate::table::{Cell, Key, MeasurementTable};
use crate::uncertain::UncertainValue;

/// One `(current, duration)` category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoherenceCategory {
    pub current: Cell,
    pub duration: f64,
}

impl std::fmt::Display for CoherenceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "current={}, duration={}", self.current, self.duration)
    }
}

/// Derived coherence values of one category.
///
/// Heralded fields keep the `gh2*` keys of the lab's `hbt_measurements.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoherenceMeasurement {
    pub current: Cell,
    pub duration: f64,
    pub g2: f64,
    pub g2_error: f64,
    pub g2_percentage_error: Option<f64>,
    #[serde(rename = "gh2")]
    pub g2h: f64,
    #[serde(rename = "gh2_error")]
    pub g2h_error: f64,
    #[serde(rename = "gh2_percentage_error")]
    pub g2h_percentage_error: Option<f64>,
}

/// Categories in discovery order: currents as first seen, then each current's
/// durations as first seen.
pub fn categories(
    table: &MeasurementTable,
    schema: &CoherenceSchema,
) -> Result<Vec<CoherenceCategory>, AnalysisError> {
    let mut out = Vec::new();
    for current in table.unique_values(&schema.current_column)? {
        let Some(key) = current.as_key() else { continue };
        let rows = table.select(&[(schema.current_column.as_str(), key)])?;
        for duration in rows.unique_values(&schema.duration_column)? {
            let duration = duration.as_f64().ok_or_else(|| AnalysisError::InvalidInput(format!(
                "non-numeric duration `{duration}` for current {current}"
            )))?;
            out.push(CoherenceCategory {
                current: current.clone(),
                duration,
            });
        }
    }
    Ok(out)
}

/// Rows of one category.
pub fn category_table(
    table: &MeasurementTable,
    schema: &CoherenceSchema,
    category: &CoherenceCategory,
) -> Result<MeasurementTable, AnalysisError> {
    let current = category.current.as_key().ok_or_else(|| {
        AnalysisError::InvalidInput("category current must not be empty".to_string())
    })?;
    table.select(&[
        (schema.current_column.as_str(), current),
        (schema.duration_column.as_str(), Key::Number(category.duration)),
    ])
}

/// The single row named `name` within a category table.
pub fn named_count(
    sub: &MeasurementTable,
    schema: &CoherenceSchema,
    name: &str,
) -> Result<UncertainValue, AnalysisError> {
    sub.lookup(
        &[(schema.name_column.as_str(), Key::Text(name))],
        &schema.value_column,
        &schema.error_column,
    )
}

/// `g2 = N12 / (N1 · N2 · duration)`.
///
/// Precondition: N1, N2 and N12 are independent measurements.
pub fn g2(
    table: &MeasurementTable,
    schema: &CoherenceSchema,
    category: &CoherenceCategory,
) -> Result<UncertainValue, AnalysisError> {
    let sub = category_table(table, schema, category)?;
    let n1 = named_count(&sub, schema, "N1")?;
    let n2 = named_count(&sub, schema, "N2")?;
    let n12 = named_count(&sub, schema, "N12")?;
    n12.checked_div((n1 * n2).scale(category.duration))
}

/// Heralded `g2h = (N0 · N012) / (N01 · N02)`.
///
/// Precondition: the four counts are independent measurements.
pub fn g2_heralded(
    table: &MeasurementTable,
    schema: &CoherenceSchema,
    category: &CoherenceCategory,
) -> Result<UncertainValue, AnalysisError> {
    let sub = category_table(table, schema, category)?;
    let n0 = named_count(&sub, schema, "N0")?;
    let n01 = named_count(&sub, schema, "N01")?;
    let n02 = named_count(&sub, schema, "N02")?;
    let n012 = named_count(&sub, schema, "N012")?;
    (n0 * n012).checked_div(n01 * n02)
}

/// Both coherence values of one category.
pub fn measure(
    table: &MeasurementTable,
    schema: &CoherenceSchema,
    category: &CoherenceCategory,
) -> Result<CoherenceMeasurement, AnalysisError> {
    let g2 = g2(table, schema, category)?;
    let g2h = g2_heralded(table, schema, category)?;
    debug!(%category, g2 = %g2, g2h = %g2h, "coherence");
    Ok(CoherenceMeasurement {
        current: category.current.clone(),
        duration: category.duration,
        g2: g2.nominal(),
        g2_error: g2.stddev(),
        g2_percentage_error: g2.percentage_error(),
        g2h: g2h.nominal(),
        g2h_error: g2h.stddev(),
        g2h_percentage_error: g2h.percentage_error(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(f64, f64, &str, f64, f64)]) -> MeasurementTable {
        let s = CoherenceSchema::default();
        let columns = vec![
            s.current_column,
            s.duration_column,
            s.name_column,
            s.value_column,
            s.error_column,
        ];
        let rows = rows
            .iter()
            .map(|(c, d, n, v, e)| {
                vec![
                    Cell::Number(*c),
                    Cell::Number(*d),
                    Cell::Text(n.to_string()),
                    Cell::Number(*v),
                    Cell::Number(*e),
                ]
            })
            .collect();
        MeasurementTable::new(columns, rows).unwrap()
    }

    fn full_category(current: f64, duration: f64) -> Vec<(f64, f64, &'static str, f64, f64)> {
        vec![
            (current, duration, "N1", 1000.0, 10.0),
            (current, duration, "N2", 2000.0, 20.0),
            (current, duration, "N12", 40.0, 2.0),
            (current, duration, "N0", 500.0, 5.0),
            (current, duration, "N01", 50.0, 1.0),
            (current, duration, "N02", 40.0, 1.0),
            (current, duration, "N012", 2.0, 0.5),
        ]
    }

    #[test]
    fn g2_matches_hand_computation() {
        let t = table(&full_category(1.5, 10.0));
        let cat = CoherenceCategory {
            current: Cell::Number(1.5),
            duration: 10.0,
        };
        let g = g2(&t, &CoherenceSchema::default(), &cat).unwrap();
        let expected = 40.0 / (1000.0 * 2000.0 * 10.0);
        assert!((g.nominal() - expected).abs() < 1e-15);
        let rel = (0.01f64.powi(2) + 0.01f64.powi(2) + 0.05f64.powi(2)).sqrt();
        assert!((g.stddev() - expected * rel).abs() < 1e-15);

        let gh = g2_heralded(&t, &CoherenceSchema::default(), &cat).unwrap();
        assert!((gh.nominal() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn missing_n2_is_measurement_not_found() {
        let rows: Vec<_> = full_category(1.5, 10.0)
            .into_iter()
            .filter(|r| r.2 != "N2")
            .collect();
        let t = table(&rows);
        let cat = CoherenceCategory {
            current: Cell::Number(1.5),
            duration: 10.0,
        };
        let err = g2(&t, &CoherenceSchema::default(), &cat).unwrap_err();
        assert!(matches!(err, AnalysisError::MeasurementNotFound { ref key } if key.contains("N2")));
    }

    #[test]
    fn duplicate_name_is_ambiguous() {
        let mut rows = full_category(1.5, 10.0);
        rows.push((1.5, 10.0, "N1", 990.0, 10.0));
        let t = table(&rows);
        let cat = CoherenceCategory {
            current: Cell::Number(1.5),
            duration: 10.0,
        };
        let err = g2(&t, &CoherenceSchema::default(), &cat).unwrap_err();
        assert!(matches!(err, AnalysisError::AmbiguousMeasurement { count: 2, .. }));
    }

    #[test]
    fn categories_follow_discovery_order() {
        let mut rows = full_category(2.0, 5.0);
        rows.extend(full_category(1.0, 10.0));
        rows.extend(full_category(2.0, 1.0));
        let t = table(&rows);
        let cats = categories(&t, &CoherenceSchema::default()).unwrap();
        let pairs: Vec<(Option<f64>, f64)> = cats.iter().map(|c| (c.current.as_f64(), c.duration)).collect();
        assert_eq!(pairs, vec![(Some(2.0), 5.0), (Some(2.0), 1.0), (Some(1.0), 10.0)]);

        // Other categories' rows do not leak into a lookup.
        let m = measure(&t, &CoherenceSchema::default(), &cats[1]).unwrap();
        assert_eq!(m.duration, 1.0);
        assert!(m.g2_percentage_error.unwrap() > 0.0);
    }

    #[test]
    fn zero_duration_fails_on_division() {
        let t = table(&full_category(1.0, 0.0));
        let cat = CoherenceCategory {
            current: Cell::Number(1.0),
            duration: 0.0,
        };
        let err = g2(&t, &CoherenceSchema::default(), &cat).unwrap_err();
        assert!(matches!(err, AnalysisError::DivisionByZero { .. }));
    }

    #[test]
    fn report_uses_lab_key_names() {
        let t = table(&full_category(1.0, 10.0));
        let cat = CoherenceCategory {
            current: Cell::Number(1.0),
            duration: 10.0,
        };
        let m = measure(&t, &CoherenceSchema::default(), &cat).unwrap();
        let json = serde_json::to_value(&m).unwrap();
        for key in ["g2", "g2_error", "g2_percentage_error", "gh2", "gh2_error", "gh2_percentage_error"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("g2h").is_none());
        assert_eq!(json["gh2"].as_f64(), Some(m.g2h));
    }
}
