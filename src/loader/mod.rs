//! Loader - obtains the two survey extracts, tags and concatenates them

pub mod fetch;

use crate::cache::DownloadCache;
use crate::config::SourceConfig;
use crate::{PrevalenceError, Result, SourceCount, SourceTag};
use csv::StringRecord;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Rows of one extract, every row implicitly tagged with `source`
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub source: SourceTag,
    /// File path or URL the rows came from
    pub origin: String,
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
}

impl RawFrame {
    /// Index of a column, matched case-insensitively
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Concatenation of the tagged extracts, in configuration order
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub frames: Vec<RawFrame>,
}

impl RawDataset {
    pub fn row_count(&self) -> usize {
        self.frames.iter().map(|f| f.len()).sum()
    }

    /// Rows per source
    pub fn counts(&self) -> Vec<SourceCount> {
        self.frames
            .iter()
            .map(|f| SourceCount {
                source: f.source.clone(),
                rows: f.len(),
            })
            .collect()
    }
}

/// Reads extracts from disk, or from the download cache / network when a URL is configured
pub struct Loader {
    base_dir: PathBuf,
    delimiter: u8,
    cache: DownloadCache,
}

impl Loader {
    pub fn new(base_dir: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            base_dir: base_dir.into(),
            delimiter,
            cache: DownloadCache::disabled(),
        }
    }

    pub fn with_cache(mut self, cache: DownloadCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    /// Load every source and concatenate
    pub fn load(&mut self, sources: &[SourceConfig]) -> Result<RawDataset> {
        let mut frames = Vec::with_capacity(sources.len());
        for source in sources {
            let (bytes, origin) = self.read_source(source)?;
            let frame = self.parse(SourceTag::new(&source.tag), &origin, &bytes)?;
            tracing::info!(source = %frame.source, rows = frame.len(), origin = %frame.origin, "loaded extract");
            frames.push(frame);
        }
        Ok(RawDataset { frames })
    }

    fn read_source(&mut self, source: &SourceConfig) -> Result<(Vec<u8>, String)> {
        let path = self.base_dir.join(&source.path);
        if path.exists() {
            let bytes = fs::read(&path).map_err(|e| PrevalenceError::Io {
                path: path.clone(),
                source: e,
            })?;
            return Ok((bytes, path.display().to_string()));
        }

        let Some(url) = source.url.as_deref() else {
            return Err(PrevalenceError::MissingDataset {
                tag: source.tag.clone(),
                path,
            });
        };

        if let Some(bytes) = self.cache.get(url) {
            tracing::debug!(url, "using cached download");
            return Ok((bytes, url.to_string()));
        }

        if !fetch::is_fetch_available() {
            return Err(PrevalenceError::FetchDisabled {
                tag: source.tag.clone(),
            });
        }

        let bytes = fetch::download(url)?;
        if let Err(e) = self.cache.set(url, &bytes) {
            tracing::warn!(url, error = %e, "failed to cache download");
        }
        Ok((bytes, url.to_string()))
    }

    /// Parse delimited text (optionally gzip-compressed) into a tagged frame
    pub fn parse(&self, source: SourceTag, origin: &str, bytes: &[u8]) -> Result<RawFrame> {
        let text = decompress(bytes, origin)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_slice());

        let csv_error = |e: csv::Error| PrevalenceError::Csv {
            origin: origin.to_string(),
            source: e,
        };

        let headers = reader.headers().map_err(csv_error)?.clone();
        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(csv_error)?;

        Ok(RawFrame {
            source,
            origin: origin.to_string(),
            headers,
            records,
        })
    }
}

/// Inflate gzip content, detected by its magic bytes; other content is returned as-is
fn decompress(bytes: &[u8], origin: &str) -> Result<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| PrevalenceError::Io {
            path: PathBuf::from(origin),
            source: e,
        })?;
    Ok(out)
}
