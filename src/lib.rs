//! Doc Cache - a coalescing response cache for document listings
//!
//! Serves per-user file listings from a TTL cache, collapsing concurrent misses
//! for the same user into a single upstream gateway call.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
