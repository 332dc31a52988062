//! Write-Behind Persistence
//!
//! Wraps a [`Persistence`] so that saving only parks the latest snapshot in
//! memory. A writer task hands parked snapshots to the blocking pool, so request
//! handlers never wait on disk I/O. Saves arriving while a write is running
//! collapse into the next one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::persistence::{Persistence, Snapshot};
use crate::error::Result;

pub struct WriteBehind<T> {
    pending: Arc<Pending<T>>,
    wake: mpsc::Sender<()>,
}

struct Pending<T> {
    snapshot: Mutex<Option<Snapshot<T>>>,
    /// Held while a snapshot is written, so writes never interleave
    writing: Mutex<()>,
    target: Arc<dyn Persistence<T>>,
}

impl<T> Pending<T> {
    fn write(&self) {
        let _writing = self.writing.lock();
        let Some(snapshot) = self.snapshot.lock().take() else {
            return;
        };

        match self.target.save(&snapshot) {
            Ok(()) => debug!(entries = snapshot.len(), "cache snapshot written"),
            Err(err) => warn!(error = %err, "failed to persist cache snapshot; continuing in memory"),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> WriteBehind<T> {
    /// Starts the writer task on the current tokio runtime.
    ///
    /// The task ends after a final write once every handle is dropped.
    pub fn spawn(target: Arc<dyn Persistence<T>>) -> Self {
        let pending = Arc::new(Pending {
            snapshot: Mutex::new(None),
            writing: Mutex::new(()),
            target,
        });
        let (wake, mut woken) = mpsc::channel(1);

        let writer = pending.clone();
        tokio::spawn(async move {
            while woken.recv().await.is_some() {
                let writer = writer.clone();
                if let Err(err) = tokio::task::spawn_blocking(move || writer.write()).await {
                    warn!(error = %err, "cache snapshot writer failed");
                }
            }
            writer.write();
        });

        Self { pending, wake }
    }
}

impl<T: Clone + Send + Sync + 'static> Persistence<T> for WriteBehind<T> {
    fn load(&self, now: u64) -> Snapshot<T> {
        self.pending.target.load(now)
    }

    fn save(&self, entries: &Snapshot<T>) -> Result<()> {
        *self.pending.snapshot.lock() = Some(entries.clone());
        // A full channel already holds a wake-up for this snapshot.
        self.wake.try_send(()).ok();
        Ok(())
    }

    fn flush(&self) {
        self.pending.write();
        self.pending.target.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::persistence::JsonFilePersistence;
    use crate::cache::CacheEntry;
    use crate::error::CacheError;
    use std::time::Duration;

    /// Counts saves and records the size of the last one.
    #[derive(Default)]
    struct Recording {
        saves: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl Persistence<String> for Recording {
        fn load(&self, _now: u64) -> Snapshot<String> {
            Snapshot::new()
        }

        fn save(&self, entries: &Snapshot<String>) -> Result<()> {
            self.saves.lock().push(entries.len());
            if self.fail {
                return Err(CacheError::Persistence(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    fn snapshot(size: usize) -> Snapshot<String> {
        (0..size)
            .map(|i| {
                let entry = CacheEntry::new(format!("v{i}"), Duration::from_secs(60), 1_000);
                (format!("k{i}"), entry)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_save_returns_before_writing() {
        let target = Arc::new(Recording::default());
        let persistence = WriteBehind::spawn(target.clone());

        persistence.save(&snapshot(1)).unwrap();
        // No await point yet, so the writer task has not run.
        assert!(target.saves.lock().is_empty());

        persistence.flush();
        assert_eq!(*target.saves.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_rapid_saves_keep_only_latest() {
        let target = Arc::new(Recording::default());
        let persistence = WriteBehind::spawn(target.clone());

        for size in 1..=5 {
            persistence.save(&snapshot(size)).unwrap();
        }
        persistence.flush();

        assert_eq!(*target.saves.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_writer_task_persists_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let persistence = WriteBehind::spawn(Arc::new(JsonFilePersistence::new(&path)));

        persistence.save(&snapshot(2)).unwrap();
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let loaded: Snapshot<String> = JsonFilePersistence::new(&path).load(1_000);
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_is_logged_not_returned() {
        let target = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let persistence = WriteBehind::spawn(target.clone());

        assert!(persistence.save(&snapshot(1)).is_ok());
        persistence.flush();
        assert_eq!(target.saves.lock().len(), 1);
    }
}
