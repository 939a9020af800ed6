//! Download cache for remote survey extracts
//!
//! Downloaded files are stored under `.prevalence-cache/`, named by the
//! SHA256 of their URL, and listed in a versioned JSON index together with
//! the SHA256 of their content so a truncated or edited file is refetched.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const CACHE_VERSION: u32 = 1;
pub const CACHE_DIRNAME: &str = ".prevalence-cache";
const INDEX_FILENAME: &str = "index.json";

/// Cache entry for a single downloaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// File name inside the cache directory
    file_name: String,
    /// SHA256 hash of the file content
    content_hash: String,
    /// Size in bytes
    size: u64,
    /// Timestamp when cached
    cached_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheData {
    /// Cache format version
    version: u32,
    /// Map of URL to cache entry
    entries: HashMap<String, CacheEntry>,
}

impl Default for CacheData {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// Cache manager for downloaded extracts
pub struct DownloadCache {
    dir: PathBuf,
    data: CacheData,
    dirty: bool,
    enabled: bool,
}

impl DownloadCache {
    /// Open (or lazily create) the cache under `root`
    pub fn new(root: &Path) -> Self {
        let dir = root.join(CACHE_DIRNAME);
        let data = Self::load_index(&dir.join(INDEX_FILENAME)).unwrap_or_default();

        Self {
            dir,
            data,
            dirty: false,
            enabled: true,
        }
    }

    /// Create a disabled cache (no-op)
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            data: CacheData::default(),
            dirty: false,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn load_index(path: &Path) -> Option<CacheData> {
        let content = fs::read_to_string(path).ok()?;
        let data: CacheData = serde_json::from_str(&content).ok()?;

        // Check version compatibility
        if data.version != CACHE_VERSION {
            return None;
        }

        Some(data)
    }

    /// Save the index to disk
    pub fn save(&self) -> Result<()> {
        if !self.enabled || !self.dirty {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;
        let content =
            serde_json::to_string_pretty(&self.data).context("Failed to serialize cache index")?;
        let index = self.dir.join(INDEX_FILENAME);
        fs::write(&index, content)
            .with_context(|| format!("Failed to write cache index to {}", index.display()))?;

        Ok(())
    }

    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Cached content for `url`, if present and unmodified
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }

        let entry = self.data.entries.get(url)?;
        let bytes = fs::read(self.dir.join(&entry.file_name)).ok()?;
        if Self::hash_bytes(&bytes) != entry.content_hash {
            return None;
        }
        Some(bytes)
    }

    /// Store downloaded content for `url`
    pub fn set(&mut self, url: &str, bytes: &[u8]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;
        let file_name = Self::hash_bytes(url.as_bytes());
        let path = self.dir.join(&file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write cached download {}", path.display()))?;

        let cached_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.data.entries.insert(
            url.to_string(),
            CacheEntry {
                file_name,
                content_hash: Self::hash_bytes(bytes),
                size: bytes.len() as u64,
                cached_at,
            },
        );
        self.dirty = true;
        Ok(())
    }

    /// Remove every cached download
    pub fn clear(&mut self) {
        for entry in self.data.entries.values() {
            let _ = fs::remove_file(self.dir.join(&entry.file_name));
        }
        self.data.entries.clear();
        self.dirty = true;
    }

    /// Number of cached downloads
    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }
}
