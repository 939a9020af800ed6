//! Reporter module for output formatting

pub mod console;
pub mod html;
pub mod json;
pub mod markdown;
pub mod table;

pub use console::ConsoleReporter;
pub use html::HtmlReporter;
pub use json::JsonReporter;
pub use markdown::MarkdownReporter;
pub use table::{format_estimate, format_p_value, ComparisonTable, SummaryTable};
