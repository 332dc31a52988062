//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::{info, warn};

use super::auth::{require_admin, Caller};
use crate::cache::key::namespace_prefix;
use crate::cache::persistence::{JsonFilePersistence, NoPersistence, Persistence};
use crate::cache::{
    Cache, Clock, FetchOptions, Fetched, FileBackend, StampedeWaiter, SystemClock, WriteBehind,
};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::{FileListing, GatewayClient};
use crate::models::{
    FilesQuery, FilesResponse, HealthResponse, InvalidateResponse, SessionFilesResponse,
    StatsResponse,
};

/// Resource name of a user's file listing within their namespace.
pub const FILES_RESOURCE: &str = "files";

/// Listing tier shared with other server processes through a snapshot file.
pub type SharedListings = StampedeWaiter<FileListing, FileBackend<FileListing>>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Listing cache, keyed per caller
    pub cache: Cache<FileListing>,
    pub gateway: GatewayClient,
    /// TTL of the empty listing cached when the gateway fails; `None` surfaces the error
    pub fail_open: Option<Duration>,
    /// Token that may clear the whole cache; `None` disables clearing
    pub admin_token: Option<String>,
    /// Consulted on a local miss before the gateway is called
    pub shared: Option<Arc<SharedListings>>,
}

impl AppState {
    /// Creates a new AppState that surfaces gateway failures.
    pub fn new(cache: Cache<FileListing>, gateway: GatewayClient) -> Self {
        Self {
            cache,
            gateway,
            fail_open: None,
            admin_token: None,
            shared: None,
        }
    }

    pub fn with_fail_open(mut self, ttl: Option<Duration>) -> Self {
        self.fail_open = ttl;
        self
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    pub fn with_shared(mut self, shared: SharedListings) -> Self {
        self.shared = Some(Arc::new(shared));
        self
    }

    /// Creates a new AppState from configuration.
    ///
    /// With `SHARED_CACHE_FILE` the listings live in a snapshot that other
    /// processes coordinate through. Otherwise `CACHE_FILE`, when set, is
    /// restored here and then written behind by a background task. Must be
    /// called within a tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let snapshot = |path: &PathBuf| {
            JsonFilePersistence::new(path.clone())
                .with_max_entry_bytes(config.max_persisted_entry_bytes)
        };

        let mut shared = None;
        let persistence: Arc<dyn Persistence<FileListing>> =
            match (&config.shared_cache_file, &config.cache_file) {
                (Some(path), local) => {
                    if local.is_some() {
                        warn!("CACHE_FILE is ignored while SHARED_CACHE_FILE is set");
                    }
                    shared = Some(StampedeWaiter::new(
                        FileBackend::new(snapshot(path), clock.clone()),
                        config.cache_settings(),
                        config.stampede_settings(),
                    ));
                    Arc::new(NoPersistence)
                }
                (None, Some(path)) => Arc::new(WriteBehind::spawn(Arc::new(snapshot(path)))),
                (None, None) => Arc::new(NoPersistence),
            };

        let cache = Cache::new(config.cache_settings(), persistence, clock);
        let state = Self::new(cache, GatewayClient::new(config.files_gateway_url.clone()))
            .with_fail_open(config.fail_open_ttl())
            .with_admin_token(config.admin_token.clone());

        match shared {
            Some(shared) => state.with_shared(shared),
            None => state,
        }
    }

    /// Returns the caller's listing, fetching it from the gateway on a miss.
    pub async fn user_files(&self, caller: Caller, force_refresh: bool) -> Result<Fetched<FileListing>> {
        let key = caller.key(FILES_RESOURCE);
        let token = caller.into_token();
        let gateway = self.gateway.clone();

        let mut options = FetchOptions::new().force_refresh(force_refresh);
        if let Some(ttl) = self.fail_open {
            options = options.fail_open(ttl);
        }

        let Some(shared) = self.shared.clone() else {
            return self
                .cache
                .get(
                    &key,
                    move || async move { gateway.fetch_files(Some(token)).await },
                    options,
                )
                .await;
        };

        // Waiting on another process counts against the fetch budget.
        let options = options.with_timeout(self.cache.settings().fetch_timeout + shared.settings().max_wait());
        let shared_key = key.clone();
        self.cache
            .get(
                &key,
                move || async move {
                    shared
                        .get(
                            &shared_key,
                            move || async move { gateway.fetch_files(Some(token)).await },
                            FetchOptions::new().force_refresh(force_refresh),
                        )
                        .await
                        .map(|fetched| fetched.value)
                        .map_err(|err| err.into_fetch_error())
                },
                options,
            )
            .await
    }

    /// Drops every listing cached for `namespace`, here and in the shared tier.
    pub async fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let mut removed = self.cache.invalidate_namespace(namespace);
        if let Some(shared) = &self.shared {
            removed = removed.max(shared.invalidate_prefix(namespace_prefix(namespace)).await?);
        }
        Ok(removed)
    }

    /// Drops every cached listing, here and in the shared tier.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = self.cache.len();
        self.cache.clear();
        if let Some(shared) = &self.shared {
            removed = removed.max(shared.invalidate_prefix(String::new()).await?);
        }
        Ok(removed)
    }
}

/// Handler for GET /api/files
///
/// Lists the caller's files, coalescing concurrent requests into one gateway call.
pub async fn files_handler(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
    headers: HeaderMap,
) -> Result<Json<FilesResponse>> {
    let caller = Caller::from_headers(&headers)?;
    let fetched = state.user_files(caller, query.refresh).await?;
    let age = fetched.age_secs(state.cache.now_ms());

    Ok(Json(FilesResponse::new(fetched, age)))
}

/// Handler for GET /api/sessions/:session_id/files
///
/// Serves the files of one upload session out of the caller's cached listing.
pub async fn session_files_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<FilesQuery>,
    headers: HeaderMap,
) -> Result<Json<SessionFilesResponse>> {
    let caller = Caller::from_headers(&headers)?;
    let fetched = state.user_files(caller, query.refresh).await?;
    let age = fetched.age_secs(state.cache.now_ms());

    Ok(Json(SessionFilesResponse::new(session_id, &fetched, age)))
}

/// Handler for DELETE /api/cache
///
/// Only the configured operator token may clear every caller's listings.
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InvalidateResponse>> {
    require_admin(&headers, state.admin_token.as_deref())?;
    let removed = state.clear().await?;

    Ok(Json(InvalidateResponse::cleared(removed)))
}

/// Handler for DELETE /api/cache/me
///
/// Called after the caller's uploads, deletions or processing change their listing.
pub async fn invalidate_own_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InvalidateResponse>> {
    let caller = Caller::from_headers(&headers)?;
    let removed = state.invalidate_namespace(caller.namespace()).await?;
    info!(removed, "caller cache invalidated");

    Ok(Json(InvalidateResponse::own(removed)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
