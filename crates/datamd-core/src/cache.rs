/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * On-disk cache of rendered directive output.
 */

//! Cache manager.
//!
//! One file per entry, `<sha256-hex>.cache`, holding a small JSON document
//! with the source modification time it was computed from, the time it was
//! stored, and the rendered block. An entry is used only while the source
//! file still has the recorded modification time and the entry file is no
//! older than the configured TTL. Entries that are stale, unreadable or
//! corrupt are deleted and reported as a miss.
//!
//! Writes go to a temporary file in the cache directory that is renamed into
//! place, so concurrent writers never expose partial entries; the last
//! rename wins.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use datamd_config::CacheConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{DataMdError, Result};
use crate::handler::RenderedBlock;
use crate::path::ResolvedPath;
use crate::sanitize::SanitizedArgs;

/// Bumped whenever the key derivation or entry layout changes.
const CACHE_FORMAT_VERSION: &str = "datamd-cache-v2";
const ENTRY_EXTENSION: &str = "cache";

/// Deterministic identity of one directive result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    digest: String,
    source_mtime_ns: u64,
}

impl CacheKey {
    /// Key over the absolute path, modification time, command, sanitized
    /// arguments and the handler's configuration salt.
    pub fn new(path: &ResolvedPath, command: &str, args: &SanitizedArgs, salt: &str) -> Self {
        let source_mtime_ns = path.mtime_nanos();

        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };
        field(CACHE_FORMAT_VERSION);
        field(&path.absolute_path().to_string_lossy());
        field(&source_mtime_ns.to_string());
        field(command);
        for (name, value) in &args.keyword {
            field(name);
            field(&value.to_string());
        }
        field("--");
        for (name, value) in &args.positional {
            field(name);
            field(&value.to_string());
        }
        field("--");
        field(salt);

        Self {
            digest: format!("{:x}", hasher.finalize()),
            source_mtime_ns,
        }
    }

    /// Lowercase hex SHA-256 digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    source_mtime_ns: u64,
    /// Seconds since the Unix epoch
    stored_at: u64,
    payload: RenderedBlock,
}

/// Why an entry could not be used. Never leaves this module.
#[derive(Debug)]
enum EntryError {
    Io(std::io::Error),
    Corrupt(serde_json::Error),
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryError::Io(e) => write!(f, "unreadable: {}", e),
            EntryError::Corrupt(e) => write!(f, "corrupt: {}", e),
        }
    }
}

/// Summary of the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub directory: PathBuf,
    pub entries: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct CacheManager {
    directory: PathBuf,
    ttl: Duration,
}

impl CacheManager {
    /// Open (creating if needed) a cache in `directory`.
    pub fn new(directory: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| DataMdError::io(&directory, e))?;
        Ok(Self { directory, ttl })
    }

    /// The cache described by `config`, or `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(
            config.resolve_directory(),
            Duration::from_secs(config.ttl_seconds),
        )
        .map(Some)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.directory
            .join(format!("{}.{}", key.digest, ENTRY_EXTENSION))
    }

    /// The stored block for `key`, if present and still valid.
    pub fn get(&self, key: &CacheKey) -> Option<RenderedBlock> {
        let path = self.entry_path(key);
        if !path.exists() {
            tracing::debug!(key = %key.digest, "Cache miss");
            return None;
        }

        let entry = match read_entry(&path) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Dropping cache entry: {}", e);
                remove_quietly(&path);
                return None;
            }
        };

        if entry.source_mtime_ns != key.source_mtime_ns {
            tracing::debug!(key = %key.digest, "Cache entry is older than its source");
            remove_quietly(&path);
            return None;
        }
        if self.is_expired(&path) {
            tracing::debug!(key = %key.digest, "Cache entry expired");
            remove_quietly(&path);
            return None;
        }

        tracing::debug!(key = %key.digest, "Cache hit");
        Some(entry.payload)
    }

    /// Store `block` under `key`.
    pub fn set(&self, key: &CacheKey, block: &RenderedBlock) -> Result<()> {
        let entry = CacheEntry {
            source_mtime_ns: key.source_mtime_ns,
            stored_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            payload: block.clone(),
        };
        let body =
            serde_json::to_vec(&entry).map_err(|e| DataMdError::Cache(e.to_string()))?;

        let mut tmp =
            NamedTempFile::new_in(&self.directory).map_err(|e| DataMdError::io(&self.directory, e))?;
        tmp.write_all(&body)
            .map_err(|e| DataMdError::io(tmp.path(), e))?;
        let target = self.entry_path(key);
        tmp.persist(&target)
            .map_err(|e| DataMdError::io(&target, e.error))?;
        Ok(())
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        tracing::debug!(removed, "Cleared cache");
        Ok(removed)
    }

    /// Remove expired and corrupt entries. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let stale = self.is_expired(&path) || read_entry(&path).is_err();
            if stale && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn info(&self) -> Result<CacheInfo> {
        let files = self.entry_files()?;
        let total_bytes = files
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        Ok(CacheInfo {
            directory: self.directory.clone(),
            entries: files.len(),
            total_bytes,
        })
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match std::fs::read_dir(&self.directory) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DataMdError::io(&self.directory, e)),
        };
        Ok(read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION))
            .collect())
    }

    fn is_expired(&self, path: &Path) -> bool {
        let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return true;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age > self.ttl,
            // Written "in the future" (clock skew): not expired.
            Err(_) => false,
        }
    }
}

fn read_entry(path: &Path) -> std::result::Result<CacheEntry, EntryError> {
    let bytes = std::fs::read(path).map_err(EntryError::Io)?;
    serde_json::from_slice(&bytes).map_err(EntryError::Corrupt)
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), "Could not remove cache entry: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve;
    use crate::sanitize::ArgValue;
    use datamd_config::SecurityConfig;

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: CacheManager,
        source: ResolvedPath,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "a\n1\n").unwrap();
        let source = resolve("data.csv", dir.path(), &SecurityConfig::default()).unwrap();
        let cache = CacheManager::new(dir.path().join("cache"), ttl).unwrap();
        Fixture {
            _dir: dir,
            cache,
            source,
        }
    }

    fn args(sep: &str) -> SanitizedArgs {
        SanitizedArgs {
            positional: vec![("separator".to_string(), ArgValue::Text(sep.to_string()))],
            ..SanitizedArgs::default()
        }
    }

    #[test]
    fn test_key_is_deterministic_and_argument_sensitive() {
        let f = fixture(Duration::from_secs(60));
        let a = CacheKey::new(&f.source, "csv", &args(","), "");
        let b = CacheKey::new(&f.source, "csv", &args(","), "");
        let c = CacheKey::new(&f.source, "csv", &args(";"), "");
        let d = CacheKey::new(&f.source, "json", &args(","), "");

        let e = CacheKey::new(&f.source, "csv", &args(","), "stream:100");

        assert_eq!(a, b);
        assert_ne!(a.digest(), c.digest());
        assert_ne!(a.digest(), e.digest());
        assert_ne!(a.digest(), d.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_set_then_get() {
        let f = fixture(Duration::from_secs(60));
        let key = CacheKey::new(&f.source, "csv", &args(","), "");
        assert_eq!(f.cache.get(&key), None);

        let block = RenderedBlock::new("| a |\n| --- |\n| 1 |");
        f.cache.set(&key, &block).unwrap();
        assert_eq!(f.cache.get(&key), Some(block));

        let info = f.cache.info().unwrap();
        assert_eq!(info.entries, 1);
        assert!(info.total_bytes > 0);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_removed() {
        let f = fixture(Duration::from_secs(60));
        let key = CacheKey::new(&f.source, "csv", &args(","), "");
        let path = f.cache.entry_path(&key);
        std::fs::write(&path, b"{ definitely not json").unwrap();

        assert_eq!(f.cache.get(&key), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let f = fixture(Duration::ZERO);
        let key = CacheKey::new(&f.source, "csv", &args(","), "");
        f.cache.set(&key, &RenderedBlock::new("x")).unwrap();

        let old = SystemTime::now() - Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(f.cache.entry_path(&key))
            .unwrap()
            .set_modified(old)
            .unwrap();

        assert_eq!(f.cache.get(&key), None);
        assert_eq!(f.cache.info().unwrap().entries, 0);
    }

    #[test]
    fn test_clear_and_sweep() {
        let f = fixture(Duration::from_secs(3600));
        for sep in [",", ";", "|"] {
            let key = CacheKey::new(&f.source, "csv", &args(sep), "");
            f.cache.set(&key, &RenderedBlock::new(sep)).unwrap();
        }
        std::fs::write(f.cache.directory().join("junk.cache"), "nope").unwrap();
        std::fs::write(f.cache.directory().join("keep.txt"), "other").unwrap();

        assert_eq!(f.cache.sweep().unwrap(), 1);
        assert_eq!(f.cache.info().unwrap().entries, 3);
        assert_eq!(f.cache.clear().unwrap(), 3);
        assert_eq!(f.cache.info().unwrap().entries, 0);
        assert!(f.cache.directory().join("keep.txt").exists());
    }

    #[test]
    fn test_disabled_cache_from_config() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(CacheManager::from_config(&config).unwrap().is_none());
    }
}
