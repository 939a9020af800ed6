//! Comparison and summary tables shared by every reporter

use crate::{AnnotatedRow, EstimateRecord, Report, SourceInfo};
use serde::Serialize;

/// Placeholder for an undefined value
pub const UNDEFINED: &str = "—";
/// Appended to the p-value column of significant rows
pub const SIGNIFICANT_MARKER: &str = "*";

/// `<0.001` below one in a thousand, three decimals otherwise
pub fn format_p_value(p_value: Option<f64>) -> String {
    match p_value {
        Some(p) if p < 0.001 => "<0.001".to_string(),
        Some(p) => format!("{:.3}", p),
        None => UNDEFINED.to_string(),
    }
}

/// Proportion as a percentage with one decimal
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v * 100.0),
        None => UNDEFINED.to_string(),
    }
}

/// Interval coverage as a percentage label: 0.95 -> "95", 0.975 -> "97.5"
pub fn format_level(level: f64) -> String {
    let label = format!("{:.1}", level * 100.0);
    label.strip_suffix(".0").unwrap_or(&label).to_string()
}

/// `point (lower, upper)` in percent
pub fn format_estimate(estimate: &EstimateRecord) -> String {
    match (estimate.mean, estimate.ci_lower, estimate.ci_upper) {
        (Some(_), Some(_), Some(_)) => format!(
            "{} ({}, {})",
            format_percent(estimate.mean),
            format_percent(estimate.ci_lower),
            format_percent(estimate.ci_upper)
        ),
        (Some(_), _, _) => format_percent(estimate.mean),
        _ => UNDEFINED.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub age_band: String,
    pub condition: String,
    /// One formatted estimate per source, in source order
    pub estimates: Vec<String>,
    pub p_value: String,
    pub significant: bool,
}

impl ComparisonRow {
    pub fn marker(&self) -> &'static str {
        if self.significant {
            SIGNIFICANT_MARKER
        } else {
            ""
        }
    }
}

/// Wide table: one row per retained (band, condition) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonTable {
    pub headers: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn from_report(report: &Report) -> Self {
        let mut headers = vec!["Age group".to_string(), "Condition".to_string()];
        let level = format_level(report.confidence_level);
        headers.extend(
            report
                .sources
                .iter()
                .map(|s| format!("{} % ({}% CI)", s.tag, level)),
        );
        headers.push("p-value".to_string());

        let mut rows = Vec::new();
        for band in &report.age_bands {
            for condition in &report.conditions {
                let pair = report.rows_for(&band.code, &condition.code);
                let Some(first) = pair.first() else {
                    continue;
                };
                let estimates = report
                    .sources
                    .iter()
                    .map(|s| {
                        pair.iter()
                            .find(|r| r.estimate.source == s.tag)
                            .map(|r| format_estimate(&r.estimate))
                            .unwrap_or_else(|| UNDEFINED.to_string())
                    })
                    .collect();
                rows.push(ComparisonRow {
                    age_band: band.label.clone(),
                    condition: condition.label.clone(),
                    estimates,
                    p_value: format_p_value(first.test.outcome.p_value()),
                    significant: first.significant,
                });
            }
        }

        Self { headers, rows }
    }

    /// Header and cells as plain strings, marker appended to the p-value
    pub fn cells(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.age_band.clone(), row.condition.clone()];
                cells.extend(row.estimates.iter().cloned());
                cells.push(format!("{}{}", row.p_value, row.marker()));
                cells
            })
            .collect()
    }
}

/// Significant conditions of one band, grouped by the source with the higher estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBand {
    pub age_band: String,
    /// Parallel to [`SummaryTable::sources`]
    pub higher_in: Vec<Vec<String>>,
}

impl SummaryBand {
    pub fn is_empty(&self) -> bool {
        self.higher_in.iter().all(|c| c.is_empty())
    }
}

/// Directional summary of the significant findings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTable {
    pub sources: Vec<SourceInfo>,
    pub bands: Vec<SummaryBand>,
}

impl SummaryTable {
    pub fn from_report(report: &Report) -> Self {
        let bands = report
            .age_bands
            .iter()
            .map(|band| {
                let mut higher_in = vec![Vec::new(); report.sources.len()];
                for condition in &report.conditions {
                    let pair = report.rows_for(&band.code, &condition.code);
                    if !pair.first().map(|r| r.significant).unwrap_or(false) {
                        continue;
                    }
                    if let Some(source) = higher_source(report, &pair) {
                        higher_in[source].push(condition.label.clone());
                    }
                }
                SummaryBand {
                    age_band: band.label.clone(),
                    higher_in,
                }
            })
            .collect();

        Self {
            sources: report.sources.clone(),
            bands,
        }
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["Age group".to_string()];
        headers.extend(self.sources.iter().map(|s| format!("Higher in {}", s.tag)));
        headers
    }

    pub fn has_findings(&self) -> bool {
        self.bands.iter().any(|b| !b.is_empty())
    }

    pub fn cells(&self) -> Vec<Vec<String>> {
        self.bands
            .iter()
            .map(|band| {
                let mut cells = vec![band.age_band.clone()];
                cells.extend(band.higher_in.iter().map(|c| {
                    if c.is_empty() {
                        UNDEFINED.to_string()
                    } else {
                        c.join(", ")
                    }
                }));
                cells
            })
            .collect()
    }
}

/// Index of the source with the strictly largest point estimate
fn higher_source(report: &Report, pair: &[&AnnotatedRow]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    let mut tied = false;
    for row in pair {
        let (Some(index), Some(mean)) = (
            report.sources.iter().position(|s| s.tag == row.estimate.source),
            row.estimate.mean,
        ) else {
            continue;
        };
        match best {
            Some((_, top)) if mean == top => tied = true,
            Some((_, top)) if mean < top => {}
            _ => {
                best = Some((index, mean));
                tied = false;
            }
        }
    }
    if tied {
        None
    } else {
        best.map(|(index, _)| index)
    }
}
