//! Cache Module
//!
//! Request-coalescing response cache with TTL expiry, optional persistence, and
//! a polling fallback for executors that share no memory, such as several
//! processes sharing one snapshot file.

pub mod coalescer;
mod entry;
pub mod inflight;
pub mod key;
pub mod persistence;
pub mod shared_file;
pub mod stampede;
mod stats;
mod store;
pub mod write_behind;


// Re-export public types
pub use coalescer::{Cache, CacheSettings, CacheValue, FetchOptions, Fetched, Source};
pub use entry::{current_timestamp_ms, CacheEntry, Clock, ManualClock, SystemClock};
pub use inflight::InFlightRegistry;
pub use key::{CacheKey, ANONYMOUS_NAMESPACE};
pub use persistence::{JsonFilePersistence, NoPersistence, Persistence};
pub use shared_file::FileBackend;
pub use stampede::{MemoryBackend, SharedBackend, StampedeSettings, StampedeWaiter};
pub use stats::CacheStats;
pub use store::CacheStore;
pub use write_behind::WriteBehind;
