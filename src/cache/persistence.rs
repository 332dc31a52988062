//! Persistence Module
//!
//! Saves the cache to a durable medium after every mutation and restores it at
//! startup. Persistence is best-effort: a corrupt or unreadable snapshot loads as
//! empty, and save failures are reported to the store, which logs and ignores them.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::error::Result;

/// In-memory form of a persisted cache: raw key to entry.
pub type Snapshot<T> = HashMap<String, CacheEntry<T>>;

/// Default ceiling for a single persisted value.
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 100_000;

const SNAPSHOT_VERSION: u32 = 1;

// == Persistence Trait ==
pub trait Persistence<T>: Send + Sync {
    /// Reads the snapshot, dropping entries that are expired at `now`.
    fn load(&self, now: u64) -> Snapshot<T>;

    /// Replaces the persisted snapshot with `entries`.
    fn save(&self, entries: &Snapshot<T>) -> Result<()>;

    /// Blocks until every accepted save has reached the medium.
    fn flush(&self) {}
}

// == No Persistence ==
/// Keeps the cache purely in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl<T> Persistence<T> for NoPersistence {
    fn load(&self, _now: u64) -> Snapshot<T> {
        HashMap::new()
    }

    fn save(&self, _entries: &Snapshot<T>) -> Result<()> {
        Ok(())
    }
}

// == JSON File Persistence ==
#[derive(Serialize)]
struct SnapshotRef<'a, T> {
    version: u32,
    entries: BTreeMap<&'a str, &'a CacheEntry<T>>,
}

#[derive(Deserialize)]
struct SnapshotFile<T> {
    version: u32,
    entries: HashMap<String, CacheEntry<T>>,
}

/// Stores the snapshot as a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
    max_entry_bytes: usize,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    /// Values whose JSON encoding is larger than `bytes` are kept out of the file.
    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn discard_corrupt(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove corrupt cache snapshot");
        }
    }
}

impl<T> Persistence<T> for JsonFilePersistence
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn load(&self, now: u64) -> Snapshot<T> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return HashMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read cache snapshot");
                return HashMap::new();
            }
        };

        let file: SnapshotFile<T> = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding corrupt cache snapshot");
                self.discard_corrupt();
                return HashMap::new();
            }
        };

        if file.version != SNAPSHOT_VERSION {
            warn!(version = file.version, "discarding cache snapshot with unknown version");
            return HashMap::new();
        }

        let total = file.entries.len();
        let live: Snapshot<T> = file
            .entries
            .into_iter()
            .filter(|(_, entry)| entry.is_live(now))
            .collect();

        debug!(restored = live.len(), expired = total - live.len(), "loaded cache snapshot");
        live
    }

    fn save(&self, entries: &Snapshot<T>) -> Result<()> {
        let mut kept = BTreeMap::new();
        for (key, entry) in entries {
            let size = match serde_json::to_vec(&entry.value) {
                Ok(encoded) => encoded.len(),
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping cache entry that cannot be serialized");
                    continue;
                }
            };
            if size >= self.max_entry_bytes {
                debug!(key = %key, size, "entry too large to persist");
                continue;
            }
            kept.insert(key.as_str(), entry);
        }

        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            entries: kept,
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        // Write-then-rename so a crash mid-write never leaves a truncated snapshot.
        let temp_path = self.temp_path();
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
