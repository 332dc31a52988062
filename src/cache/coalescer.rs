//! Coalescing Cache Module
//!
//! [`Cache`] answers `get` from a live entry when it can, otherwise attaches the
//! caller to the fetch already running for the key, otherwise starts that fetch.
//! Fetch results populate the store; failures are shared with every attached
//! caller and never cached unless the caller asked to fail open.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::inflight::{Computation, InFlightRegistry, Outcome};
use crate::cache::key::namespace_prefix;
use crate::cache::persistence::{NoPersistence, Persistence};
use crate::cache::{CacheEntry, CacheKey, CacheStats, CacheStore, Clock, SystemClock};
use crate::error::{CacheError, FetchError, Result};

/// Values the cache can hold. `Default` is the empty result served when failing open.
pub trait CacheValue: Clone + Default + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Default + Send + Sync + 'static {}

// == Source ==
/// Where the value returned by a `get` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A live cache entry
    Cache,
    /// A fetch started by another caller that this caller waited for
    #[serde(rename = "cache_after_wait")]
    Coalesced,
    /// A fetch started by this caller
    Fresh,
    /// The fetch failed and the empty result was cached instead
    FailOpen,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Coalesced => "cache_after_wait",
            Source::Fresh => "fresh",
            Source::FailOpen => "fail_open",
        }
    }
}

// == Fetched ==
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: Source,
    /// Creation time of the entry the value came from (Unix milliseconds)
    pub created_at: u64,
}

impl<T> Fetched<T> {
    pub fn from_entry(entry: CacheEntry<T>, source: Source) -> Self {
        Self {
            value: entry.value,
            source,
            created_at: entry.created_at,
        }
    }

    /// Age of the value in whole seconds at `now`.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at) / 1000
    }

    /// The same outcome as seen by a caller that attached to someone else's fetch.
    fn attached(mut self) -> Self {
        if self.source == Source::Fresh {
            self.source = Source::Coalesced;
        }
        self
    }
}

// == Settings ==
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL applied when a `get` does not name one
    pub default_ttl: Duration,
    /// Upper bound on a single upstream fetch
    pub fetch_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-call options for [`Cache::get`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub ttl: Option<Duration>,
    /// Skip the cache lookup and fetch, unless a fetch is already in flight
    pub force_refresh: bool,
    /// Cache `T::default()` for this long when the fetch fails, instead of failing
    pub fail_open: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn fail_open(mut self, ttl: Duration) -> Self {
        self.fail_open = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runs `fetch` under `timeout`, turning an elapsed timer into a fetch failure.
pub(crate) async fn fetch_with_timeout<T, Fut>(
    fetch: Fut,
    timeout: Duration,
) -> std::result::Result<T, FetchError>
where
    Fut: Future<Output = std::result::Result<T, FetchError>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

/// Turns a fetch result into the outcome shared with callers.
///
/// `store` persists the value and returns the entry it created; it is only
/// called on success, or with `T::default()` when failing open.
pub(crate) fn settle<T, S>(
    key: &CacheKey,
    result: std::result::Result<T, FetchError>,
    ttl: Duration,
    fail_open: Option<Duration>,
    store: S,
) -> Outcome<T>
where
    T: Default,
    S: FnOnce(T, Duration) -> CacheEntry<T>,
{
    match result {
        Ok(value) => Ok(Fetched::from_entry(store(value, ttl), Source::Fresh)),
        Err(err) => match fail_open {
            Some(fail_open_ttl) => {
                warn!(key = %key, error = %err, "fetch failed; caching empty result");
                let entry = store(T::default(), fail_open_ttl);
                Ok(Fetched::from_entry(entry, Source::FailOpen))
            }
            None => {
                warn!(key = %key, error = %err, "fetch failed");
                Err(err)
            }
        },
    }
}

// == Cache ==
/// A coalescing response cache. Cloning yields another handle to the same cache.
pub struct Cache<T> {
    inner: Arc<CacheInner<T>>,
}

struct CacheInner<T> {
    store: Mutex<CacheStore<T>>,
    inflight: InFlightRegistry<T>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: CacheValue> Cache<T> {
    // == Constructor ==
    /// Creates a cache seeded from `persistence`.
    pub fn new(
        settings: CacheSettings,
        persistence: Arc<dyn Persistence<T>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = CacheStore::new(persistence, clock.clone());
        Self {
            inner: Arc::new(CacheInner {
                store: Mutex::new(store),
                inflight: InFlightRegistry::new(),
                settings,
                clock,
            }),
        }
    }

    /// Creates a memory-only cache on the wall clock.
    pub fn in_memory(settings: CacheSettings) -> Self {
        Self::new(settings, Arc::new(NoPersistence), Arc::new(SystemClock))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    // == Get ==
    /// Returns the value for `key`, fetching it with `fetch` on a miss.
    ///
    /// Concurrent callers for the same key share a single invocation of `fetch`
    /// and all observe its outcome. The fetch runs as its own task, so a caller
    /// going away does not cancel it for the others. `fetch` is invoked while the
    /// in-flight registry is locked and must not call back into this cache.
    pub async fn get<F, Fut>(&self, key: &CacheKey, fetch: F, options: FetchOptions) -> Result<Fetched<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>> + Send + 'static,
    {
        let (computation, owner) = {
            // The store is checked under the registry lock: a fetch populates the
            // store before it leaves the registry, so no settled fetch is missed.
            let mut slots = self.inner.inflight.lock();

            if !options.force_refresh {
                if let Some(entry) = self.inner.store.lock().get(key) {
                    debug!(key = %key, age_ms = entry.age_ms(self.now_ms()), "cache hit");
                    return Ok(Fetched::from_entry(entry, Source::Cache));
                }
            }

            match slots.try_attach(key) {
                Some(computation) => {
                    debug!(key = %key, "fetch already in flight; waiting for it");
                    self.inner.store.lock().stats_mut().record_coalesced();
                    (computation, false)
                }
                None => {
                    debug!(key = %key, force_refresh = options.force_refresh, "cache miss; fetching");
                    self.inner.store.lock().stats_mut().record_fetch();
                    let computation = self.spawn_fetch(key, fetch(), &options);
                    (slots.register(key, computation), true)
                }
            }
        };

        let outcome = computation
            .await
            .map_err(|_| CacheError::Interrupted(format!("fetch for '{key}' ended without a result")))?;
        let fetched = outcome?;

        Ok(if owner { fetched } else { fetched.attached() })
    }

    /// Spawns `fetch` and returns the channel its outcome is delivered on.
    ///
    /// The registry slot is released by a drop guard owned by the task, before the
    /// outcome is sent, so callers either attach to a channel that will receive
    /// data or find the populated store.
    fn spawn_fetch<Fut>(&self, key: &CacheKey, fetch: Fut, options: &FetchOptions) -> Computation<T>
    where
        Fut: Future<Output = std::result::Result<T, FetchError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let ttl = options.ttl.unwrap_or(self.inner.settings.default_ttl);
        let timeout = options.timeout.unwrap_or(self.inner.settings.fetch_timeout);
        let fail_open = options.fail_open;
        let release_token = self.inner.inflight.release_on_drop(key);
        let cache = self.clone();
        let key = key.clone();

        tokio::spawn(async move {
            let result = fetch_with_timeout(fetch, timeout).await;
            let outcome = cache.complete(&key, result, ttl, fail_open);
            drop(release_token);
            sender.send(outcome).ok();
        });

        receiver.shared()
    }

    fn complete(
        &self,
        key: &CacheKey,
        result: std::result::Result<T, FetchError>,
        ttl: Duration,
        fail_open: Option<Duration>,
    ) -> Outcome<T> {
        let mut store = self.inner.store.lock();
        let failed = result.is_err();

        let outcome = settle(key, result, ttl, fail_open, |value, ttl| store.set(key, value, ttl));

        if failed {
            store.stats_mut().record_fetch_failure(fail_open.is_some());
        } else {
            info!(key = %key, ttl_secs = ttl.as_secs(), "cached fresh value");
        }
        outcome
    }

    // == Direct Access ==
    /// Returns the live value for `key` without fetching.
    pub fn peek(&self, key: &CacheKey) -> Option<Fetched<T>> {
        self.inner
            .store
            .lock()
            .peek(key)
            .cloned()
            .map(|entry| Fetched::from_entry(entry, Source::Cache))
    }

    /// Stores `value` directly, replacing any entry for `key`.
    pub fn set(&self, key: &CacheKey, value: T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.inner.settings.default_ttl);
        self.inner.store.lock().set(key, value, ttl);
    }

    // == Invalidation ==
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.store.lock().invalidate(key)
    }

    /// Drops every entry belonging to `namespace`.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let removed = self
            .inner
            .store
            .lock()
            .invalidate_prefix(&namespace_prefix(namespace));
        info!(namespace, removed, "invalidated namespace");
        removed
    }

    pub fn clear(&self) {
        self.inner.store.lock().clear();
        info!("cleared entire cache");
    }

    pub fn prune_expired(&self) -> usize {
        self.inner.store.lock().prune_expired()
    }

    // == Introspection ==
    pub fn stats(&self) -> CacheStats {
        let in_flight = self.inner.inflight.len();
        let mut stats = self.inner.store.lock().stats();
        stats.in_flight = in_flight;
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Writes out any snapshot still queued for persistence. Called on shutdown.
    pub fn flush(&self) {
        self.inner.store.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::persistence::JsonFilePersistence;
    use crate::cache::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with_clock() -> (Cache<Vec<String>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = Cache::new(CacheSettings::default(), Arc::new(NoPersistence), clock.clone());
        (cache, clock)
    }

    /// A fetch that counts its invocations and answers after `latency`.
    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        latency: Duration,
        result: std::result::Result<Vec<String>, FetchError>,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, std::result::Result<Vec<String>, FetchError>>
    {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(latency).await;
                result
            }
            .boxed()
        }
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_fetch() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");

        let gets = (0..8).map(|_| {
            cache.get(
                &key,
                counting_fetch(&calls, Duration::from_millis(200), Ok(files(&["a.pdf"]))),
                FetchOptions::new(),
            )
        });
        let results = futures::future::join_all(gets).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let mut sources = Vec::new();
        for result in results {
            let fetched = result.unwrap();
            assert_eq!(fetched.value, files(&["a.pdf"]));
            sources.push(fetched.source);
        }
        assert_eq!(sources.iter().filter(|s| **s == Source::Fresh).count(), 1);
        assert_eq!(sources.iter().filter(|s| **s == Source::Coalesced).count(), 7);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.stats().coalesced, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_callers_share_one_fetch() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let fetch = counting_fetch(&calls, Duration::from_millis(50), Ok(files(&["x"])));
                tokio::spawn(async move {
                    cache
                        .get(&CacheKey::new("user42", "files"), fetch, FetchOptions::new())
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().value, files(&["x"]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_after_fetch() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");

        let first = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["a"]))), FetchOptions::new())
            .await
            .unwrap();
        let second = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["b"]))), FetchOptions::new())
            .await
            .unwrap();

        assert_eq!(first.source, Source::Fresh);
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.value, files(&["a"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let (cache, clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");
        let options = FetchOptions::new().with_ttl(Duration::from_millis(100));

        cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["old"]))), options.clone())
            .await
            .unwrap();
        clock.advance(Duration::from_millis(150));
        let refreshed = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["new"]))), options)
            .await
            .unwrap();

        assert_eq!(refreshed.source, Source::Fresh);
        assert_eq!(refreshed.value, files(&["new"]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = cache
            .get(
                &CacheKey::new("A", "files"),
                counting_fetch(&calls, Duration::ZERO, Ok(files(&["a-secret"]))),
                FetchOptions::new(),
            )
            .await
            .unwrap();
        let b = cache
            .get(
                &CacheKey::new("B", "files"),
                counting_fetch(&calls, Duration::ZERO, Ok(files(&["b-secret"]))),
                FetchOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(a.value, files(&["a-secret"]));
        assert_eq!(b.value, files(&["b-secret"]));
        assert_eq!(b.source, Source::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_waiters_and_is_not_cached() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");
        let failure = FetchError::Upstream("502 Bad Gateway".into());

        let gets = (0..3).map(|_| {
            cache.get(
                &key,
                counting_fetch(&calls, Duration::from_millis(100), Err(failure.clone())),
                FetchOptions::new(),
            )
        });
        for result in futures::future::join_all(gets).await {
            assert!(matches!(result, Err(CacheError::Fetch(ref err)) if *err == failure));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);

        let retry = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["ok"]))), FetchOptions::new())
            .await
            .unwrap();
        assert_eq!(retry.source, Source::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().fetch_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_fetch_failure() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::anonymous("files");
        let options = FetchOptions::new().with_timeout(Duration::from_millis(50));

        let result = cache
            .get(&key, counting_fetch(&calls, Duration::from_secs(5), Ok(files(&["late"]))), options)
            .await;

        assert!(matches!(
            result,
            Err(CacheError::Fetch(FetchError::Timeout(timeout))) if timeout == Duration::from_millis(50)
        ));
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.peek(&key).is_none());
    }

    #[tokio::test]
    async fn test_fail_open_caches_empty_result() {
        let (cache, clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");
        let options = FetchOptions::new().fail_open(Duration::from_secs(30));

        let degraded = cache
            .get(
                &key,
                counting_fetch(&calls, Duration::ZERO, Err(FetchError::MissingCredentials("no token".into()))),
                options.clone(),
            )
            .await
            .unwrap();
        assert_eq!(degraded.source, Source::FailOpen);
        assert!(degraded.value.is_empty());

        // The sentinel shields the upstream until it expires.
        let cached = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["a"]))), options.clone())
            .await
            .unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(31));
        let recovered = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["a"]))), options)
            .await
            .unwrap();
        assert_eq!(recovered.value, files(&["a"]));
        assert_eq!(cache.stats().fail_open, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_fetch() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");

        cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["old"]))), FetchOptions::new())
            .await
            .unwrap();
        assert!(cache.invalidate(&key));
        let fetched = cache
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(files(&["new"]))), FetchOptions::new())
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Fresh);
        assert_eq!(fetched.value, files(&["new"]));
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_live_entry() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");

        cache.set(&key, files(&["stale"]), None);
        let fetched = cache
            .get(
                &key,
                counting_fetch(&calls, Duration::ZERO, Ok(files(&["fresh"]))),
                FetchOptions::new().force_refresh(true),
            )
            .await
            .unwrap();

        assert_eq!(fetched.value, files(&["fresh"]));
        assert_eq!(cache.peek(&key).unwrap().value, files(&["fresh"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_attaches_to_running_fetch() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("user42", "files");

        let first = cache.get(
            &key,
            counting_fetch(&calls, Duration::from_millis(100), Ok(files(&["one"]))),
            FetchOptions::new(),
        );
        let forced = cache.get(
            &key,
            counting_fetch(&calls, Duration::ZERO, Ok(files(&["two"]))),
            FetchOptions::new().force_refresh(true),
        );
        let (first, forced) = futures::future::join(first, forced).await;

        assert_eq!(first.unwrap().value, files(&["one"]));
        assert_eq!(forced.unwrap().source, Source::Coalesced);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_namespace_and_clear() {
        let (cache, _) = cache_with_clock();
        cache.set(&CacheKey::new("user4", "files"), files(&["a"]), None);
        cache.set(&CacheKey::new("user4", "folders"), files(&["b"]), None);
        cache.set(&CacheKey::new("user42", "files"), files(&["c"]), None);

        assert_eq!(cache.invalidate_namespace("user4"), 2);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_restart_restores_persisted_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let clock = Arc::new(ManualClock::new(1_000_000));
        let key = CacheKey::new("user42", "files");

        {
            let cache: Cache<Vec<String>> = Cache::new(
                CacheSettings::default(),
                Arc::new(JsonFilePersistence::new(&path)),
                clock.clone(),
            );
            cache.set(&key, files(&["kept.pdf"]), Some(Duration::from_secs(3600)));
        }

        clock.advance(Duration::from_secs(1800));
        let restarted: Cache<Vec<String>> = Cache::new(
            CacheSettings::default(),
            Arc::new(JsonFilePersistence::new(&path)),
            clock.clone(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let fetched = restarted
            .get(&key, counting_fetch(&calls, Duration::ZERO, Ok(Vec::new())), FetchOptions::new())
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Cache);
        assert_eq!(fetched.value, files(&["kept.pdf"]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_source_names() {
        assert_eq!(Source::Coalesced.as_str(), "cache_after_wait");
        assert_eq!(
            serde_json::to_string(&Source::Coalesced).unwrap(),
            "\"cache_after_wait\""
        );
        assert_eq!(serde_json::to_string(&Source::FailOpen).unwrap(), "\"fail_open\"");
    }

    #[test]
    fn test_age_secs() {
        let fetched = Fetched {
            value: (),
            source: Source::Cache,
            created_at: 10_000,
        };
        assert_eq!(fetched.age_secs(12_999), 2);
        assert_eq!(fetched.age_secs(5_000), 0);
    }
}
