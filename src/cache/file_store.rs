//! File Store Module
//!
//! Durable backend keeping one JSON record per key in a directory.
//!
//! Every write produces a complete replacement record in a temporary file,
//! flushes it and renames it over the previous record, so a crash mid-write
//! leaves either the old record or the new one, never a mix.
//!
//! Records are named by the SHA-256 digest of the key, which keeps every
//! file name the same length whatever the location string is. The full key
//! is stored inside the record and checked on read.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::store::accepts;
use crate::cache::{CacheEntry, CacheKey, CacheStore, PutOutcome};
use crate::error::{CacheError, Result};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

type KeyLock = Arc<Mutex<()>>;

// == File Store ==
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    /// Write locks for keys with an operation in progress; reads rely on
    /// rename atomicity instead
    locks: DashMap<CacheKey, KeyLock>,
    temp_seq: AtomicU64,
}

impl FileStore {
    // == Constructor ==
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// Temporary files left behind by an interrupted write are removed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        for item in std::fs::read_dir(&dir)? {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION) {
                warn!("Removing leftover temp record {}", path.display());
                std::fs::remove_file(&path)?;
            }
        }

        Ok(Self {
            dir,
            locks: DashMap::new(),
            temp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem(key), RECORD_EXTENSION))
    }

    fn lock_for(&self, key: &CacheKey) -> KeyLock {
        self.locks.entry(key.clone()).or_default().clone()
    }

    /// Forgets the key's lock once no other task holds or waits on it.
    fn release(&self, key: &CacheKey, lock: KeyLock) {
        drop(lock);
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn read_record(path: &Path) -> Result<Option<CacheEntry>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_key(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        match Self::read_record(&self.record_path(key)).await? {
            Some(entry) if entry.key != *key => {
                warn!("Record for {} holds key {}, ignoring", key, entry.key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn write_record(&self, entry: &CacheEntry) -> Result<()> {
        let target = self.record_path(&entry.key);
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!(
            "{}.{}.{}",
            file_stem(&entry.key),
            seq,
            TEMP_EXTENSION
        ));

        let bytes = serde_json::to_vec(entry)
            .map_err(|e| CacheError::Internal(format!("serialize record: {}", e)))?;

        let mut file = fs::File::create(&temp).await?;
        let written = async {
            file.write_all(&bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        drop(file);

        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    async fn put_locked(&self, entry: CacheEntry) -> Result<PutOutcome> {
        let current = match self.read_key(&entry.key).await {
            Ok(current) => current,
            Err(CacheError::Unavailable(msg)) => {
                // A corrupt record is replaced rather than blocking the key forever.
                warn!("Overwriting unreadable record for {}: {}", entry.key, msg);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(current) = current {
            if !accepts(&current, &entry) {
                debug!("Rejected older write for {}", entry.key);
                return Ok(PutOutcome::Rejected);
            }
        }

        self.write_record(&entry).await?;
        Ok(PutOutcome::Stored)
    }

    async fn remove_locked(&self, key: &CacheKey) -> Result<bool> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the record at `path` if it is still older than `cutoff`.
    async fn purge_locked(path: &Path, cutoff: DateTime<Utc>) -> Result<bool> {
        // Re-check under the lock: a fresh write may have landed meanwhile.
        match Self::read_record(path).await {
            Ok(Some(current)) if current.fetched_at < cutoff => {
                fs::remove_file(path).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.read_key(key).await
    }

    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome> {
        let key = entry.key.clone();
        let lock = self.lock_for(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.put_locked(entry).await
        };
        self.release(&key, lock);
        outcome
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let lock = self.lock_for(key);
        let removed = {
            let _guard = lock.lock().await;
            self.remove_locked(key).await
        };
        self.release(key, lock);
        removed
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for path in self.record_paths().await? {
            let entry = match Self::read_record(&path).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };
            if entry.fetched_at >= cutoff {
                continue;
            }

            let lock = self.lock_for(&entry.key);
            let purged = {
                let _guard = lock.lock().await;
                Self::purge_locked(&path, cutoff).await
            };
            self.release(&entry.key, lock);
            if purged? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.record_paths().await?.len())
    }
}

/// Hex SHA-256 of the key: a fixed-length name safe on any filesystem.
fn file_stem(key: &CacheKey) -> String {
    hex::encode(Sha256::digest(key.as_str().as_bytes()))
}
