//! Stampede Waiter Module
//!
//! Coordinates executors that share a store but no memory, such as several server
//! workers in front of one external cache. Instead of attaching to a running
//! fetch, a caller that sees another executor's fetching flag polls the shared
//! store for a bounded number of attempts. If the flag holder never delivers, the
//! caller clears the flag and fetches on its own, trading an occasional duplicate
//! fetch for never waiting on a crashed holder forever.
//!
//! Backend calls may block on I/O, so the waiter runs them on tokio's blocking
//! pool. Only the release from the claim guard runs inline.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::coalescer::{fetch_with_timeout, settle, CacheSettings, CacheValue, FetchOptions, Fetched, Source};
use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::error::{CacheError, FetchError, Result};

// == Shared Backend ==
/// A store plus per-key fetching flags, visible to every executor.
pub trait SharedBackend<T>: Send + Sync {
    /// Returns the entry for `key` if it is live.
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry<T>>;

    /// Stores `value` and returns the entry that was written.
    fn store(&self, key: &CacheKey, value: T, ttl: Duration) -> CacheEntry<T>;

    /// Sets the fetching flag for `key`. Returns false if it was already set.
    fn try_claim(&self, key: &CacheKey) -> bool;

    /// Clears the fetching flag for `key`. Must be cheap: it runs from a drop guard.
    fn release(&self, key: &CacheKey);

    /// Removes every entry whose key starts with `prefix`. Returns the number removed.
    fn invalidate_prefix(&self, prefix: &str) -> usize;

    fn now_ms(&self) -> u64;
}

/// Backend held in this process, shared by cloning the handle.
pub struct MemoryBackend<T> {
    store: Arc<Mutex<CacheStore<T>>>,
    fetching: Arc<Mutex<HashSet<String>>>,
}

impl<T> Clone for MemoryBackend<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            fetching: self.fetching.clone(),
        }
    }
}

impl<T: Clone> MemoryBackend<T> {
    pub fn new(store: CacheStore<T>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            fetching: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.fetching.lock().contains(key.as_str())
    }
}

impl<T: Clone + Send + Sync> SharedBackend<T> for MemoryBackend<T> {
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.store.lock().get(key)
    }

    fn store(&self, key: &CacheKey, value: T, ttl: Duration) -> CacheEntry<T> {
        self.store.lock().set(key, value, ttl)
    }

    fn try_claim(&self, key: &CacheKey) -> bool {
        self.fetching.lock().insert(key.as_str().to_owned())
    }

    fn release(&self, key: &CacheKey) {
        self.fetching.lock().remove(key.as_str());
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.store.lock().invalidate_prefix(prefix)
    }

    fn now_ms(&self) -> u64 {
        self.store.lock().now_ms()
    }
}

// == Settings ==
#[derive(Debug, Clone)]
pub struct StampedeSettings {
    /// Pause between two looks at the shared store
    pub poll_interval: Duration,
    /// Looks taken before giving up on the flag holder
    pub max_attempts: u32,
}

impl StampedeSettings {
    /// Longest a caller waits on another executor before fetching itself.
    pub fn max_wait(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

impl Default for StampedeSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            max_attempts: 10,
        }
    }
}

/// Progress of a single `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Idle,
    Waiting,
    ReturnedFromCache,
    Fetching,
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitState::Idle => "idle",
            WaitState::Waiting => "waiting",
            WaitState::ReturnedFromCache => "returned_from_cache",
            WaitState::Fetching => "fetching",
        };
        f.write_str(name)
    }
}

/// Clears a claimed fetching flag when dropped.
struct ClaimGuard<'a, T> {
    backend: &'a dyn SharedBackend<T>,
    key: &'a CacheKey,
}

impl<T> Drop for ClaimGuard<'_, T> {
    fn drop(&mut self) {
        self.backend.release(self.key);
    }
}

// == Stampede Waiter ==
pub struct StampedeWaiter<T, B> {
    backend: B,
    cache_settings: CacheSettings,
    settings: StampedeSettings,
    _value: PhantomData<fn() -> T>,
}

impl<T, B> StampedeWaiter<T, B>
where
    T: CacheValue,
    B: SharedBackend<T> + Clone + 'static,
{
    pub fn new(backend: B, cache_settings: CacheSettings, settings: StampedeSettings) -> Self {
        Self {
            backend,
            cache_settings,
            settings,
            _value: PhantomData,
        }
    }

    pub fn settings(&self) -> &StampedeSettings {
        &self.settings
    }

    /// Returns the value for `key`, waiting on another executor's fetch if its
    /// flag is set, and fetching with `fetch` otherwise.
    pub async fn get<F, Fut>(&self, key: &CacheKey, fetch: F, options: FetchOptions) -> Result<Fetched<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
    {
        let mut state = WaitState::Idle;

        if !options.force_refresh {
            if let Some(entry) = self.lookup(key).await? {
                return Ok(Fetched::from_entry(entry, Source::Cache));
            }
        }

        let mut claimed = self.try_claim(key).await?;
        if !claimed {
            state = self.transition(key, state, WaitState::Waiting);
            if let Some(entry) = self.wait_for_entry(key, options.force_refresh).await? {
                self.transition(key, state, WaitState::ReturnedFromCache);
                return Ok(Fetched::from_entry(entry, Source::Coalesced));
            }

            warn!(
                key = %key,
                attempts = self.settings.max_attempts,
                "waited too long for another fetch; fetching directly"
            );
            self.backend.release(key);
            claimed = self.try_claim(key).await?;
        }

        let _guard = claimed.then(|| ClaimGuard {
            backend: &self.backend as &dyn SharedBackend<T>,
            key,
        });

        // A holder that stored and released between the lookup and the claim.
        if claimed && !options.force_refresh {
            if let Some(entry) = self.lookup(key).await? {
                self.transition(key, state, WaitState::ReturnedFromCache);
                return Ok(Fetched::from_entry(entry, Source::Cache));
            }
        }

        state = self.transition(key, state, WaitState::Fetching);
        let ttl = options.ttl.unwrap_or(self.cache_settings.default_ttl);
        let timeout = options.timeout.unwrap_or(self.cache_settings.fetch_timeout);
        let result = fetch_with_timeout(fetch(), timeout).await;

        let fail_open = options.fail_open;
        let store_key = key.clone();
        let outcome = self
            .blocking(move |backend| {
                settle(&store_key, result, ttl, fail_open, |value, ttl| {
                    backend.store(&store_key, value, ttl)
                })
            })
            .await?;

        self.transition(key, state, WaitState::Idle);
        outcome.map_err(Into::into)
    }

    /// Removes every shared entry whose key starts with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: String) -> Result<usize> {
        self.blocking(move |backend| backend.invalidate_prefix(&prefix)).await
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry<T>>> {
        let key = key.clone();
        self.blocking(move |backend| backend.lookup(&key)).await
    }

    async fn try_claim(&self, key: &CacheKey) -> Result<bool> {
        let key = key.clone();
        self.blocking(move |backend| backend.try_claim(&key)).await
    }

    /// Runs `op` against a handle to the backend on the blocking pool.
    async fn blocking<R, Op>(&self, op: Op) -> Result<R>
    where
        Op: FnOnce(&B) -> R + Send + 'static,
        R: Send + 'static,
    {
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || op(&backend))
            .await
            .map_err(|err| CacheError::Interrupted(format!("shared backend call failed: {err}")))
    }

    /// Polls the shared store until a usable entry shows up or attempts run out.
    async fn wait_for_entry(&self, key: &CacheKey, force_refresh: bool) -> Result<Option<CacheEntry<T>>> {
        let waiting_since = self.backend.now_ms();

        for attempt in 1..=self.settings.max_attempts {
            tokio::time::sleep(self.settings.poll_interval).await;

            match self.lookup(key).await? {
                // A forced refresh only accepts a value written after it began waiting.
                Some(entry) if !force_refresh || entry.created_at >= waiting_since => {
                    debug!(key = %key, attempt, "cache populated during wait");
                    return Ok(Some(entry));
                }
                _ => debug!(key = %key, attempt, "cache still empty"),
            }
        }
        Ok(None)
    }

    fn transition(&self, key: &CacheKey, from: WaitState, to: WaitState) -> WaitState {
        debug!(key = %key, from = %from, to = %to, "stampede state");
        to
    }
}
