//! Caller Identity
//!
//! The gateway is the only authority on bearer tokens, and a cached listing is
//! served without calling it. A listing is therefore cached under a digest of the
//! exact token that fetched it: a caller can only ever reach entries populated
//! with its own credential. Client-supplied user headers are ignored.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use sha2::{Digest, Sha256};

use crate::cache::CacheKey;
use crate::error::{CacheError, FetchError, Result};

/// An authenticated request: its cache namespace and the token to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    namespace: String,
    token: String,
}

impl Caller {
    /// Resolves the caller from its `Authorization: Bearer` header.
    ///
    /// Requests without a token are rejected before the cache is consulted.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let token = bearer_token(headers).ok_or_else(|| {
            CacheError::Fetch(FetchError::MissingCredentials(
                "missing bearer token".to_string(),
            ))
        })?;

        Ok(Self {
            namespace: token_namespace(token),
            token: token.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of `resource` within this caller's namespace.
    pub fn key(&self, resource: &str) -> CacheKey {
        CacheKey::new(&self.namespace, resource)
    }

    pub fn into_token(self) -> String {
        self.token
    }
}

/// Cache namespace owned by `token`.
pub fn token_namespace(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Checks that the request carries the configured operator token.
///
/// Without a configured token the operation is disabled for every caller.
pub fn require_admin(headers: &HeaderMap, admin_token: Option<&str>) -> Result<()> {
    let presented = bearer_token(headers).ok_or_else(|| {
        CacheError::Fetch(FetchError::MissingCredentials(
            "missing bearer token".to_string(),
        ))
    })?;

    match admin_token {
        Some(expected) if token_namespace(presented) == token_namespace(expected) => Ok(()),
        Some(_) => Err(CacheError::Forbidden("operator token required".to_string())),
        None => Err(CacheError::Forbidden("operation disabled".to_string())),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
