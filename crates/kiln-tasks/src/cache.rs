//! Local cache of task outputs, keyed by input fingerprint
//!
//! Layout: one directory per key under the cache root, each holding a
//! `metadata.json` with the stored outputs. Entries are published with an
//! atomic no-clobber rename, so concurrent writers (threads or processes)
//! never see a partial entry and the first completed write wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use kiln_core::config::CacheConfig;
use kiln_core::LiteralMap;

use crate::fingerprint::CacheKey;

const METADATA_FILE: &str = "metadata.json";

/// A cached task result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub outputs: LiteralMap,
    pub created_at: DateTime<Utc>,
}

/// Content-addressable store of task outputs
#[derive(Debug, Clone)]
pub struct TaskCache {
    cache_dir: PathBuf,
}

impl TaskCache {
    /// Cache rooted at `cache_dir`; nothing touches disk until first use
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache at `~/.kiln/local-cache`
    pub fn default_dir() -> Self {
        Self::new(kiln_core::config::default_cache_dir())
    }

    /// Cache described by config, or `None` when caching is disabled
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config.resolved_dir()))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    fn unavailable(path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Unavailable {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Look up stored outputs; an unseen key is `Ok(None)`
    #[instrument(skip_all, fields(key = %key))]
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_dir(key).join(METADATA_FILE);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("cache miss");
                return Ok(None);
            }
            Err(e) => return Err(Self::unavailable(&path, e)),
        };

        let entry: CacheEntry =
            serde_json::from_slice(&contents).map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if &entry.key != key {
            // Two keys mapped to one file name; treat as unseen
            warn!(stored = %entry.key, "cache entry key mismatch");
            return Ok(None);
        }

        debug!("cache hit");
        Ok(Some(entry))
    }

    /// Whether an entry exists for `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_dir(key).join(METADATA_FILE).is_file()
    }

    /// Store outputs unless the key is already present
    ///
    /// Returns `true` when this call published the entry and `false` when an
    /// entry already existed.
    #[instrument(skip_all, fields(key = %key))]
    pub fn put(&self, key: &CacheKey, outputs: &LiteralMap) -> Result<bool, CacheError> {
        let entry_dir = self.entry_dir(key);
        let path = entry_dir.join(METADATA_FILE);
        if path.is_file() {
            debug!("entry already present");
            return Ok(false);
        }
        fs::create_dir_all(&entry_dir).map_err(|e| Self::unavailable(&entry_dir, e))?;

        let entry = CacheEntry {
            key: key.clone(),
            outputs: outputs.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&entry)?;

        let mut staged =
            tempfile::NamedTempFile::new_in(&entry_dir).map_err(|e| Self::unavailable(&entry_dir, e))?;
        staged
            .write_all(&json)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| Self::unavailable(staged.path(), e))?;

        match staged.persist_noclobber(&path) {
            Ok(_) => {
                debug!("stored result in cache");
                Ok(true)
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("lost publish race, keeping existing entry");
                Ok(false)
            }
            Err(e) => Err(Self::unavailable(&path, e.error)),
        }
    }

    /// Remove every entry; creates the cache root if it does not exist
    #[instrument(skip(self), fields(dir = %self.cache_dir.display()))]
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        if self.cache_dir.exists() {
            for entry in fs::read_dir(&self.cache_dir).map_err(|e| Self::unavailable(&self.cache_dir, e))? {
                let entry = entry.map_err(|e| Self::unavailable(&self.cache_dir, e))?;
                let path = entry.path();
                let result = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                result.map_err(|e| Self::unavailable(&path, e))?;
                removed += 1;
            }
        }
        fs::create_dir_all(&self.cache_dir).map_err(|e| Self::unavailable(&self.cache_dir, e))?;
        info!(removed, "cache cleared");
        Ok(removed)
    }

    /// Remove entries older than `max_age`
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, CacheError> {
        info!(max_age_secs = max_age.as_secs(), "pruning cache");
        let mut stats = PruneStats::default();

        if !self.cache_dir.exists() {
            return Ok(stats);
        }

        // An age past chrono's range keeps everything
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));

        for entry in fs::read_dir(&self.cache_dir).map_err(|e| Self::unavailable(&self.cache_dir, e))? {
            let path = entry.map_err(|e| Self::unavailable(&self.cache_dir, e))?.path();
            if !path.is_dir() {
                continue;
            }
            stats.total += 1;

            let created = fs::read(path.join(METADATA_FILE))
                .ok()
                .and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
                .map(|e| e.created_at);

            match created {
                Some(created) if cutoff.is_some_and(|cutoff| created < cutoff) => {
                    if fs::remove_dir_all(&path).is_ok() {
                        stats.removed += 1;
                        continue;
                    }
                }
                Some(_) => {}
                None => warn!(path = %path.display(), "unreadable cache entry, keeping"),
            }
            stats.kept += 1;
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "cache prune complete");
        Ok(stats)
    }

    /// Entry count and size on disk
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();

        if !self.cache_dir.exists() {
            return Ok(stats);
        }

        for entry in fs::read_dir(&self.cache_dir).map_err(|e| Self::unavailable(&self.cache_dir, e))? {
            let path = entry.map_err(|e| Self::unavailable(&self.cache_dir, e))?.path();
            if !path.is_dir() {
                continue;
            }
            stats.entries += 1;

            if let Ok(files) = fs::read_dir(&path) {
                for file in files.flatten() {
                    if let Ok(meta) = file.metadata() {
                        stats.total_size += meta.len();
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default, Clone, Serialize)]
pub struct PruneStats {
    pub total: usize,
    pub removed: usize,
    pub kept: usize,
}

/// Cache statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        const KB: f64 = 1024.0;
        let size = self.total_size as f64;
        if size < KB {
            format!("{} B", self.total_size)
        } else if size < KB * KB {
            format!("{:.1} KB", size / KB)
        } else if size < KB * KB * KB {
            format!("{:.1} MB", size / (KB * KB))
        } else {
            format!("{:.1} GB", size / (KB * KB * KB))
        }
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backing store cannot be opened, read or written
    #[error("Cache unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored entry is not valid
    #[error("Corrupt cache entry at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker running the file operation died
    #[error("Cache operation interrupted: {0}")]
    Interrupted(String),
}
