//! JSON reporter for machine-readable output

use super::table::{ComparisonTable, SummaryTable};
use crate::Report;
use serde::Serialize;

/// Reporter for JSON output
pub struct JsonReporter {
    /// Whether to pretty-print JSON
    pretty: bool,
}

impl JsonReporter {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Enable pretty-printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Full report plus both formatted tables
    pub fn report(&self, report: &Report) -> String {
        let output = JsonOutput {
            report,
            comparison: ComparisonTable::from_report(report),
            summary: SummaryTable::from_report(report),
        };

        if self.pretty {
            serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string(&output).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    #[serde(flatten)]
    report: &'a Report,
    comparison: ComparisonTable,
    summary: SummaryTable,
}
