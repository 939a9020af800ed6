//! Error type for the loading and cleaning stages

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrevalenceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },

    #[error("{tag}: column '{column}' not found")]
    MissingColumn { tag: String, column: String },

    #[error("{tag} row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        tag: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Dataset for {tag} not found at {path} and no URL is configured")]
    MissingDataset { tag: String, path: PathBuf },

    #[error("Dataset for {tag} is not available locally and downloads are disabled. Rebuild with: cargo build --features fetch")]
    FetchDisabled { tag: String },

    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error("Stratum '{0}' has a single PSU and lonelyPsu is set to fail")]
    LonelyPsu(String),

    #[error("Invalid survey design: {0}")]
    Design(String),
}

pub type Result<T> = std::result::Result<T, PrevalenceError>;
