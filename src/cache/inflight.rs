//! In-Flight Registry Module
//!
//! Tracks the one outstanding upstream fetch per key. Callers that miss the cache
//! while a fetch is running attach to its shared channel instead of starting a
//! duplicate fetch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::Shared;
use parking_lot::{Mutex, MutexGuard};

use crate::cache::coalescer::Fetched;
use crate::cache::CacheKey;
use crate::error::FetchError;

/// What every attached caller receives once a fetch settles.
pub type Outcome<T> = Result<Fetched<T>, FetchError>;

/// Receiving end of a running fetch, clonable for every attached caller.
pub type Computation<T> = Shared<oneshot::Receiver<Outcome<T>>>;

type ComputationMap<T> = Arc<Mutex<HashMap<String, Computation<T>>>>;

// == In-Flight Registry ==
pub struct InFlightRegistry<T> {
    computations: ComputationMap<T>,
}

impl<T> Clone for InFlightRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            computations: self.computations.clone(),
        }
    }
}

impl<T> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self {
            computations: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> InFlightRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the registry so that a lookup and a registration happen atomically.
    pub fn lock(&self) -> InFlightSlots<'_, T> {
        InFlightSlots {
            computations: self.computations.lock(),
        }
    }

    /// Removes the registration for `key`. Returns whether one was present.
    pub fn release(&self, key: &str) -> bool {
        self.computations.lock().remove(key).is_some()
    }

    /// Returns a guard that releases `key` when dropped, however the fetch ends.
    pub fn release_on_drop(&self, key: &CacheKey) -> CallOnDrop
    where
        T: Send + Sync + 'static,
    {
        let registry = self.clone();
        let key = key.as_str().to_owned();
        CallOnDrop::new(move || {
            registry.release(&key);
        })
    }

    pub fn len(&self) -> usize {
        self.computations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.computations.lock().is_empty()
    }
}

impl<T: Clone> InFlightRegistry<T> {
    pub fn try_attach(&self, key: &CacheKey) -> Option<Computation<T>> {
        self.lock().try_attach(key)
    }

    pub fn register(&self, key: &CacheKey, computation: Computation<T>) -> Computation<T> {
        self.lock().register(key, computation)
    }
}

// == Locked Slots ==
/// The registry while its lock is held.
pub struct InFlightSlots<'a, T> {
    computations: MutexGuard<'a, HashMap<String, Computation<T>>>,
}

impl<T: Clone> InFlightSlots<'_, T> {
    /// Returns the running fetch for `key`, if any.
    pub fn try_attach(&self, key: &CacheKey) -> Option<Computation<T>> {
        self.computations.get(key.as_str()).cloned()
    }

    /// Records `computation` for `key`.
    ///
    /// If a fetch is already registered the new one is discarded and the existing
    /// one is returned, so at most one fetch per key is ever registered.
    pub fn register(&mut self, key: &CacheKey, computation: Computation<T>) -> Computation<T> {
        self.computations
            .entry(key.as_str().to_owned())
            .or_insert(computation)
            .clone()
    }
}

// == Call On Drop ==
/// Runs a callback when dropped. The callback must not panic.
pub struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> CallOnDrop {
        CallOnDrop { f: Some(Box::new(f)) }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}
