//! Bonferroni correction over the tests that survived the reliability filter

use crate::{AnnotatedRow, Correction, JoinedRow};
use std::collections::HashSet;

/// Number of distinct (band, condition) tests among joined rows
pub fn test_count(rows: &[JoinedRow]) -> usize {
    rows.iter().map(|r| r.key()).collect::<HashSet<_>>().len()
}

/// A defined p-value at or below the corrected threshold
pub fn is_significant(p_value: Option<f64>, threshold: Option<f64>) -> bool {
    match (p_value, threshold) {
        (Some(p), Some(t)) => p <= t,
        _ => false,
    }
}

/// Annotate rows with significance at `alpha / m`, m counted from the rows themselves
pub fn bonferroni(rows: Vec<JoinedRow>, alpha: f64) -> (Vec<AnnotatedRow>, Correction) {
    let m = test_count(&rows);
    let threshold = if m > 0 { Some(alpha / m as f64) } else { None };

    let annotated = rows
        .into_iter()
        .map(|row| {
            let significant = is_significant(row.test.outcome.p_value(), threshold);
            AnnotatedRow {
                estimate: row.estimate,
                test: row.test,
                significant,
            }
        })
        .collect();

    (annotated, Correction { alpha, m, threshold })
}
