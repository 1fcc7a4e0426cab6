use crate::error::{CacheError, Result};
use crate::fingerprint::Fingerprint;
use crate::lock::CacheLock;
use crate::util::{atomic_write, now_millis, read_file_limited, remove_file_best_effort};
use crate::QGEN_VERSION;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the serialized-result file inside a cache entry. An entry is a hit exactly when
/// this file is present and valid.
pub const RESULT_FILENAME: &str = "rep_cache.json";

pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// A completed cache entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedEntry {
    pub key: Fingerprint,
    /// The entry directory holding the generated files.
    pub dir: PathBuf,
    /// The result recorded by [`CacheStore::record_result`].
    pub result: serde_json::Value,
    pub saved_at_millis: u64,
}

/// Keyed storage for generated artifact bundles.
///
/// Request logic only talks to the cache through this trait so tests (and other deployments)
/// can substitute their own store.
pub trait CacheStore {
    /// Directory of the entry for `key`. Pure path computation; does not touch the disk.
    fn entry_path(&self, key: &Fingerprint) -> PathBuf;

    /// Look up a completed entry. Unreadable, stale, or mismatched results are misses.
    fn lookup(&self, key: &Fingerprint) -> Result<Option<CachedEntry>>;

    /// Create the entry directory (and parents). Succeeds if it already exists.
    fn create_entry(&self, key: &Fingerprint) -> Result<PathBuf>;

    /// Record the serialized result, completing the entry.
    fn record_result(&self, key: &Fingerprint, result: &serde_json::Value) -> Result<()>;

    /// Take the exclusive per-key generation lock.
    fn lock_entry(&self, key: &Fingerprint) -> Result<CacheLock>;

    /// Remove the entry and everything in it. Succeeds if it does not exist.
    fn discard_entry(&self, key: &Fingerprint) -> Result<()>;
}

/// [`CacheStore`] rooted at a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalCacheStore {
    root: PathBuf,
}

impl LocalCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_path(&self, key: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.lock", key.as_str()))
    }
}

impl CacheStore for LocalCacheStore {
    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn lookup(&self, key: &Fingerprint) -> Result<Option<CachedEntry>> {
        let dir = self.entry_path(key);
        let path = dir.join(RESULT_FILENAME);
        let Some(bytes) = read_file_limited(&path) else {
            return Ok(None);
        };

        let persisted: PersistedResultOwned = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(
                    target: "qgen.cache",
                    key = %key,
                    error = %CacheError::from(err),
                    "discarding unreadable cache result"
                );
                remove_file_best_effort(&path, "lookup.corrupt");
                return Ok(None);
            }
        };

        if persisted.schema_version != RESULT_SCHEMA_VERSION
            || persisted.qgen_version != QGEN_VERSION
        {
            // Not usable by this version; drop the marker so the entry is regenerated in
            // this version's format.
            tracing::debug!(
                target: "qgen.cache",
                key = %key,
                schema_version = persisted.schema_version,
                qgen_version = %persisted.qgen_version,
                "discarding cache result from another version"
            );
            remove_file_best_effort(&path, "lookup.version_mismatch");
            return Ok(None);
        }

        if persisted.key != *key {
            // The result doesn't belong to the directory it sits in; treat as corruption.
            remove_file_best_effort(&path, "lookup.key_mismatch");
            return Ok(None);
        }

        Ok(Some(CachedEntry {
            key: persisted.key,
            dir,
            result: persisted.result,
            saved_at_millis: persisted.saved_at_millis,
        }))
    }

    fn create_entry(&self, key: &Fingerprint) -> Result<PathBuf> {
        let dir = self.entry_path(key);
        // `create_dir_all` treats an existing directory as success, so concurrent misses on
        // the same key don't fail each other.
        std::fs::create_dir_all(&dir)?;
        if !dir.is_dir() {
            return Err(CacheError::EntryNotDirectory { path: dir });
        }
        Ok(dir)
    }

    fn record_result(&self, key: &Fingerprint, result: &serde_json::Value) -> Result<()> {
        let persisted = PersistedResult {
            schema_version: RESULT_SCHEMA_VERSION,
            qgen_version: QGEN_VERSION,
            key,
            saved_at_millis: now_millis(),
            result,
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        atomic_write(&self.entry_path(key).join(RESULT_FILENAME), &bytes)
    }

    fn lock_entry(&self, key: &Fingerprint) -> Result<CacheLock> {
        CacheLock::lock_exclusive(&self.lock_path(key))
    }

    fn discard_entry(&self, key: &Fingerprint) -> Result<()> {
        match std::fs::remove_dir_all(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct PersistedResult<'a> {
    schema_version: u32,
    qgen_version: &'a str,
    key: &'a Fingerprint,
    saved_at_millis: u64,
    result: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PersistedResultOwned {
    schema_version: u32,
    qgen_version: String,
    key: Fingerprint,
    saved_at_millis: u64,
    result: serde_json::Value,
}
