//! HTTP download of survey extracts
//!
//! Requires the `fetch` feature to be enabled:
//! ```toml
//! prevalence = { version = "0.1", features = ["fetch"] }
//! ```

use crate::{PrevalenceError, Result};

/// Download `url` into memory
#[cfg(feature = "fetch")]
pub fn download(url: &str) -> Result<Vec<u8>> {
    let failed = |message: String| PrevalenceError::Download {
        url: url.to_string(),
        message,
    };

    tracing::info!(url, "downloading dataset");
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(600))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {}", status)));
    }

    let bytes = response.bytes().map_err(|e| failed(e.to_string()))?;
    tracing::info!(url, bytes = bytes.len(), "download complete");
    Ok(bytes.to_vec())
}

/// Stub implementation when fetch feature is disabled
#[cfg(not(feature = "fetch"))]
pub fn download(url: &str) -> Result<Vec<u8>> {
    Err(PrevalenceError::Download {
        url: url.to_string(),
        message: "fetch feature not enabled. Rebuild with: cargo build --features fetch"
            .to_string(),
    })
}

/// Check if the fetch feature is available
pub fn is_fetch_available() -> bool {
    cfg!(feature = "fetch")
}
