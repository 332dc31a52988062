//! Shared File Backend
//!
//! A [`SharedBackend`] that independent processes coordinate through. Entries live
//! in one JSON snapshot on a shared path. Fetching flags are files created with
//! `create_new`, which the filesystem grants to exactly one process. Snapshot
//! updates are read-modify-write under a lock file of the same kind.
//!
//! Every operation does blocking file I/O; [`StampedeWaiter`](super::StampedeWaiter)
//! runs them on the blocking pool.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::persistence::{JsonFilePersistence, Persistence, Snapshot};
use crate::cache::stampede::SharedBackend;
use crate::cache::{CacheEntry, CacheKey, Clock};

const SNAPSHOT_LOCK: &str = "snapshot.lock";
const LOCK_ATTEMPTS: u32 = 100;
const LOCK_RETRY: Duration = Duration::from_millis(5);

// == File Backend ==
pub struct FileBackend<T> {
    snapshot: JsonFilePersistence,
    /// Directory holding the fetching flags and the snapshot lock
    flags: PathBuf,
    clock: Arc<dyn Clock>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for FileBackend<T> {
    fn clone(&self) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            flags: self.flags.clone(),
            clock: self.clock.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> FileBackend<T> {
    /// Shares `snapshot` with every backend opened on the same path. Flags are
    /// kept in a `.flags` directory next to the snapshot file.
    pub fn new(snapshot: JsonFilePersistence, clock: Arc<dyn Clock>) -> Self {
        let mut flags = snapshot.path().as_os_str().to_os_string();
        flags.push(".flags");
        let flags = PathBuf::from(flags);

        if let Err(err) = fs::create_dir_all(&flags) {
            warn!(path = %flags.display(), error = %err, "failed to create flag directory");
        }

        Self {
            snapshot,
            flags,
            clock,
            _value: PhantomData,
        }
    }

    fn flag_path(&self, key: &CacheKey) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        self.flags.join(format!("{name}.fetching"))
    }

    /// Serializes snapshot rewrites across processes.
    ///
    /// A lock left behind by a crashed process is taken over once the retries
    /// run out.
    fn lock_snapshot(&self) -> FlagFile {
        let path = self.flags.join(SNAPSHOT_LOCK);
        for _ in 0..LOCK_ATTEMPTS {
            if create_flag(&path) {
                return FlagFile { path };
            }
            thread::sleep(LOCK_RETRY);
        }

        warn!(path = %path.display(), "taking over stale snapshot lock");
        FlagFile { path }
    }
}

impl<T> SharedBackend<T> for FileBackend<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let mut entries: Snapshot<T> = self.snapshot.load(self.clock.now_ms());
        entries.remove(key.as_str())
    }

    fn store(&self, key: &CacheKey, value: T, ttl: Duration) -> CacheEntry<T> {
        let entry = CacheEntry::new(value, ttl, self.clock.now_ms());

        let _lock = self.lock_snapshot();
        let mut entries: Snapshot<T> = self.snapshot.load(entry.created_at);
        entries.insert(key.as_str().to_owned(), entry.clone());
        if let Err(err) = self.snapshot.save(&entries) {
            warn!(key = %key, error = %err, "failed to write shared cache snapshot");
        }
        entry
    }

    fn try_claim(&self, key: &CacheKey) -> bool {
        create_flag(&self.flag_path(key))
    }

    fn release(&self, key: &CacheKey) {
        remove_flag(&self.flag_path(key));
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let _lock = self.lock_snapshot();
        let mut entries: Snapshot<T> = self.snapshot.load(self.clock.now_ms());
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();

        if removed > 0 {
            debug!(prefix, removed, "invalidated shared cache entries");
            if let Err(err) = self.snapshot.save(&entries) {
                warn!(error = %err, "failed to write shared cache snapshot");
            }
        }
        removed
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// A flag file removed on drop.
struct FlagFile {
    path: PathBuf,
}

impl Drop for FlagFile {
    fn drop(&mut self) {
        remove_flag(&self.path);
    }
}

/// Creates the flag at `path`. Returns false if another holder already created it.
///
/// A flag that cannot be created for any other reason counts as acquired, so a
/// broken flag directory degrades to uncoordinated fetches.
fn create_flag(path: &Path) -> bool {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => true,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => false,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to create flag file");
            true
        }
    }
}

fn remove_flag(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove flag file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    type Listing = Vec<String>;

    /// Two backends opened independently on the same snapshot path.
    fn pair(path: &Path, clock: &Arc<ManualClock>) -> (FileBackend<Listing>, FileBackend<Listing>) {
        let open = || FileBackend::new(JsonFilePersistence::new(path), clock.clone());
        (open(), open())
    }

    fn files(names: &[&str]) -> Listing {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_stored_entry_is_visible_to_other_backend() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (first, second) = pair(&dir.path().join("shared.json"), &clock);
        let key = CacheKey::new("user42", "files");

        assert!(second.lookup(&key).is_none());
        first.store(&key, files(&["a.pdf"]), Duration::from_secs(60));

        let entry = second.lookup(&key).unwrap();
        assert_eq!(entry.value, files(&["a.pdf"]));
        assert_eq!(entry.created_at, 1_000);
    }

    #[test]
    fn test_stores_from_both_backends_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (first, second) = pair(&dir.path().join("shared.json"), &clock);

        first.store(&CacheKey::new("u1", "files"), files(&["a"]), Duration::from_secs(60));
        second.store(&CacheKey::new("u2", "files"), files(&["b"]), Duration::from_secs(60));

        assert!(first.lookup(&CacheKey::new("u2", "files")).is_some());
        assert!(second.lookup(&CacheKey::new("u1", "files")).is_some());
        assert!(!dir.path().join("shared.json.flags").join(SNAPSHOT_LOCK).exists());
    }

    #[test]
    fn test_expired_entry_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (first, second) = pair(&dir.path().join("shared.json"), &clock);
        let key = CacheKey::new("user42", "files");

        first.store(&key, files(&["a"]), Duration::from_millis(100));
        clock.advance(Duration::from_millis(150));

        assert!(second.lookup(&key).is_none());
    }

    #[test]
    fn test_claim_is_exclusive_across_backends() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (first, second) = pair(&dir.path().join("shared.json"), &clock);
        let key = CacheKey::new("user42", "files");

        assert!(first.try_claim(&key));
        assert!(!second.try_claim(&key));
        assert!(second.try_claim(&CacheKey::new("user7", "files")));

        first.release(&key);
        assert!(second.try_claim(&key));
        // Releasing twice is harmless.
        second.release(&key);
        second.release(&key);
    }

    #[test]
    fn test_invalidate_prefix_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (first, second) = pair(&dir.path().join("shared.json"), &clock);
        let ttl = Duration::from_secs(60);

        first.store(&CacheKey::new("user4", "files"), files(&["a"]), ttl);
        first.store(&CacheKey::new("user42", "files"), files(&["b"]), ttl);

        let removed = second.invalidate_prefix(&crate::cache::key::namespace_prefix("user4"));

        assert_eq!(removed, 1);
        assert!(first.lookup(&CacheKey::new("user4", "files")).is_none());
        assert!(first.lookup(&CacheKey::new("user42", "files")).is_some());
        assert_eq!(second.invalidate_prefix(""), 1);
    }

    #[test]
    fn test_stale_snapshot_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (first, second) = pair(&dir.path().join("shared.json"), &clock);
        let key = CacheKey::anonymous("files");

        // A process that died while rewriting the snapshot.
        assert!(create_flag(&first.flags.join(SNAPSHOT_LOCK)));

        first.store(&key, files(&["a"]), Duration::from_secs(60));
        assert!(second.lookup(&key).is_some());
    }
}
