//! Markdown reporter: pipe tables for embedding in documents

use super::table::{ComparisonTable, SummaryTable};
use crate::Report;

pub struct MarkdownReporter {
    summary_only: bool,
}

impl MarkdownReporter {
    pub fn new() -> Self {
        Self {
            summary_only: false,
        }
    }

    pub fn summary_only(mut self) -> Self {
        self.summary_only = true;
        self
    }

    pub fn report(&self, report: &Report) -> String {
        let mut out = String::new();

        if !self.summary_only {
            let table = ComparisonTable::from_report(report);
            out.push_str("## Prevalence by data source\n\n");
            if table.rows.is_empty() {
                out.push_str("_No combination met the reliability criteria._\n\n");
            } else {
                out.push_str(&pipe_table(&table.headers, &table.cells()));
                out.push_str(&format!(
                    "\n\\* significant at alpha / m = {} / {}\n\n",
                    report.correction.alpha, report.correction.m
                ));
            }
        }

        let summary = SummaryTable::from_report(report);
        out.push_str("## Significant differences\n\n");
        if summary.has_findings() {
            out.push_str(&pipe_table(&summary.headers(), &summary.cells()));
        } else {
            out.push_str("_No significant differences._\n");
        }
        out
    }
}

impl Default for MarkdownReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('*', "\\*")
}

fn pipe_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| escape_cell(h)).collect();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}\n", " --- |".repeat(headers.len())));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::table::fixtures;

    #[test]
    fn test_markdown_tables() {
        let md = MarkdownReporter::new().report(&fixtures::report());
        assert!(md.contains("| Age group | Condition | CHC % (95% CI) | PPP % (95% CI) | p-value |"));
        assert!(md.contains("| --- | --- | --- | --- | --- |"));
        assert!(md.contains("| 18-64 years | Hypertension | 31.2 (29.2, 34.2) | 20.1 (18.1, 23.1) | <0.001\\* |"));
        assert!(md.contains("| 18-64 years | Hypertension | Hyperlipidemia |"));
    }

    #[test]
    fn test_markdown_summary_only() {
        let md = MarkdownReporter::new().summary_only().report(&fixtures::report());
        assert!(!md.contains("Prevalence by data source"));
        assert!(md.contains("## Significant differences"));
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        assert_eq!(escape_cell("a|b"), "a\\|b");
    }
}
