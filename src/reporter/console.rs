//! Console reporter with colored output

use super::table::{ComparisonTable, SummaryTable};
use crate::Report;
use colored::Colorize;

/// Reporter for terminal output
pub struct ConsoleReporter {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to list dropped combinations
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            use_colors: true,
            verbose: false,
        }
    }

    /// Disable colors
    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Print comparison table, summary table and run statistics
    pub fn report(&self, report: &Report) {
        self.print_comparison(report);
        self.print_summary(report);
        self.print_stats(report);
    }

    /// Print only the significant-findings table
    pub fn report_summary_only(&self, report: &Report) {
        self.print_summary(report);
    }

    fn print_comparison(&self, report: &Report) {
        println!();
        println!("{}", self.bold("Prevalence by data source"));
        let table = ComparisonTable::from_report(report);
        if table.rows.is_empty() {
            println!("   {}", self.dim("No combination met the reliability criteria."));
            println!();
            return;
        }
        print!("{}", self.render_grid(&table.headers, &table.cells()));
        println!(
            "   {}",
            self.dim("* significant after Bonferroni correction")
        );
        println!();
    }

    fn print_summary(&self, report: &Report) {
        println!("{}", self.bold("Significant differences"));
        let summary = SummaryTable::from_report(report);
        if !summary.has_findings() {
            println!("   {}", self.dim("No significant differences."));
            println!();
            return;
        }
        print!("{}", self.render_grid(&summary.headers(), &summary.cells()));
        println!();
    }

    fn print_stats(&self, report: &Report) {
        let stats = &report.stats;
        println!("{}", "═".repeat(60));
        println!("{}", self.bold("Summary"));
        println!("{}", "═".repeat(60));
        for (loaded, cleaned) in stats.loaded.iter().zip(&stats.cleaned) {
            println!(
                "   {}: {} rows loaded, {} in analysis",
                loaded.source, loaded.rows, cleaned.rows
            );
        }
        println!(
            "   Combinations:   {} evaluated, {} retained, {} dropped",
            stats.combinations,
            self.bold(&stats.retained.to_string()),
            report.dropped.len()
        );
        let threshold = report
            .correction
            .threshold
            .map(|t| format!("{:.5}", t))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "   Threshold:      alpha {} / m {} = {}",
            report.correction.alpha, report.correction.m, threshold
        );

        if self.verbose && !report.dropped.is_empty() {
            println!();
            println!("   {}", self.bold("Dropped combinations:"));
            for dropped in &report.dropped {
                let reasons: Vec<String> = dropped
                    .unreliable
                    .iter()
                    .map(|(tag, why)| format!("{} {}", tag, why))
                    .collect();
                println!(
                    "   {} {} / {}: {}",
                    self.warn("⚠"),
                    dropped.age_band,
                    dropped.condition,
                    reasons.join("; ")
                );
            }
        }
        println!(
            "   {}",
            self.dim(&format!(
                "Generated {}",
                report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ))
        );
        println!();
    }

    /// Left-aligned grid with a rule under the header
    pub fn render_grid(&self, headers: &[String], rows: &[Vec<String>]) -> String {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.chars().count());
                }
            }
        }

        let line = |cells: &[String]| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{}{}", cell, " ".repeat(w - cell.chars().count())))
                .collect();
            format!("   {}", padded.join("  ").trim_end())
        };

        let mut out = String::new();
        out.push_str(&self.bold(&line(headers)));
        out.push('\n');
        let rule: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        out.push_str(&format!("   {}\n", "─".repeat(rule)));
        for row in rows {
            let text = line(row);
            if self.use_colors && row.last().map(|c| c.ends_with('*')).unwrap_or(false) {
                out.push_str(&text.green().to_string());
            } else {
                out.push_str(&text);
            }
            out.push('\n');
        }
        out
    }

    fn bold(&self, s: &str) -> String {
        if self.use_colors {
            s.bold().to_string()
        } else {
            s.to_string()
        }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_colors {
            s.dimmed().to_string()
        } else {
            s.to_string()
        }
    }

    fn warn(&self, s: &str) -> String {
        if self.use_colors {
            s.yellow().to_string()
        } else {
            s.to_string()
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}
