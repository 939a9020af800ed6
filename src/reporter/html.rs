//! HTML reporter: generates a self-contained HTML document
//!
//! Tables are rendered server-side; the full report is also embedded as JSON
//! so the page can be post-processed without re-running the analysis.

use super::table::{format_level, ComparisonTable, SummaryTable};
use crate::Report;

/// Escapes a string for embedding inside a script block
fn escape_json_for_script(s: &str) -> String {
    s.replace("</script>", "<\\/script>")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Reporter that generates a self-contained HTML page
pub struct HtmlReporter;

impl HtmlReporter {
    pub fn new() -> Self {
        Self
    }

    /// Generate the full HTML report
    pub fn report(&self, report: &Report) -> String {
        let comparison = ComparisonTable::from_report(report);
        let summary = SummaryTable::from_report(report);
        let data_json = serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string());

        let mut html = String::with_capacity(16_384);
        html.push_str(Self::template_head());
        html.push_str("<main>\n<h1>Chronic condition prevalence by data source</h1>\n");
        html.push_str(&format!(
            "<p class=\"meta\">Generated {} &middot; {} of {} combinations retained &middot; \
             significance threshold {}</p>\n",
            report.generated_at.format("%Y-%m-%d %H:%M UTC"),
            report.stats.retained,
            report.stats.combinations,
            report
                .correction
                .threshold
                .map(|t| format!("{:.5}", t))
                .unwrap_or_else(|| "n/a".to_string())
        ));

        html.push_str(&format!(
            "<h2>Prevalence, % ({}% CI)</h2>\n",
            format_level(report.confidence_level)
        ));
        if comparison.rows.is_empty() {
            html.push_str("<p class=\"empty\">No combination met the reliability criteria.</p>\n");
        } else {
            let significant: Vec<bool> = comparison.rows.iter().map(|r| r.significant).collect();
            html.push_str(&Self::table(&comparison.headers, &comparison.cells(), &significant));
            html.push_str("<p class=\"note\">* significant after Bonferroni correction</p>\n");
        }

        html.push_str("<h2>Significant differences</h2>\n");
        if summary.has_findings() {
            let flags = vec![false; summary.bands.len()];
            html.push_str(&Self::table(&summary.headers(), &summary.cells(), &flags));
        } else {
            html.push_str("<p class=\"empty\">No significant differences.</p>\n");
        }

        if !report.dropped.is_empty() {
            html.push_str("<h2>Dropped combinations</h2>\n<ul class=\"dropped\">\n");
            for dropped in &report.dropped {
                let reasons: Vec<String> = dropped
                    .unreliable
                    .iter()
                    .map(|(tag, why)| format!("{} {}", tag, why))
                    .collect();
                html.push_str(&format!(
                    "<li>{} / {}: {}</li>\n",
                    escape_html(&dropped.age_band),
                    escape_html(&dropped.condition),
                    escape_html(&reasons.join("; "))
                ));
            }
            html.push_str("</ul>\n");
        }

        html.push_str("</main>\n<script type=\"application/json\" id=\"report-data\">");
        html.push_str(&escape_json_for_script(&data_json));
        html.push_str("</script>\n</body>\n</html>");
        html
    }

    fn table(headers: &[String], rows: &[Vec<String>], highlight: &[bool]) -> String {
        let mut out = String::from("<table>\n<thead><tr>");
        for header in headers {
            out.push_str(&format!("<th>{}</th>", escape_html(header)));
        }
        out.push_str("</tr></thead>\n<tbody>\n");
        for (row, &hot) in rows.iter().zip(highlight) {
            out.push_str(if hot { "<tr class=\"sig\">" } else { "<tr>" });
            for cell in row {
                out.push_str(&format!("<td>{}</td>", escape_html(cell)));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n");
        out
    }

    fn template_head() -> &'static str {
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Prevalence Report</title>
<style>
body{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;margin:0;background:#f7f8fa;color:#1f2328}
main{max-width:1100px;margin:0 auto;padding:24px}
h1{font-size:22px;margin:0 0 4px}
h2{font-size:17px;margin:28px 0 8px}
.meta,.note,.empty{color:#59636e;font-size:13px}
table{border-collapse:collapse;width:100%;background:#fff;font-size:14px}
th,td{text-align:left;padding:6px 10px;border-bottom:1px solid #e1e4e8}
th{background:#f0f2f5}
tr.sig td{background:#e8f5e9}
ul.dropped{font-size:13px;color:#59636e}
</style>
</head>
<body>
"##
    }
}

impl Default for HtmlReporter {
    fn default() -> Self {
        Self::new()
    }
}
