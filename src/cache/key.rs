//! Cache Key Module
//!
//! Namespaced cache keys. The namespace (typically a user id) is part of the key
//! so one tenant can never read another tenant's cached response.

use std::fmt;

/// Namespace used when the caller is not authenticated.
pub const ANONYMOUS_NAMESPACE: &str = "anonymous";

const SEPARATOR: char = ':';

// == Cache Key ==
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `resource` inside `namespace`.
    pub fn new(namespace: &str, resource: &str) -> Self {
        Self(format!("{}{resource}", namespace_prefix(namespace)))
    }

    pub fn anonymous(resource: &str) -> Self {
        Self::new(ANONYMOUS_NAMESPACE, resource)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Prefix shared by every key of `namespace`.
///
/// The escaped namespace never contains the separator, so the first separator in
/// a key always terminates the namespace.
pub fn namespace_prefix(namespace: &str) -> String {
    let mut prefix = String::with_capacity(namespace.len() + 1);
    for ch in namespace.chars() {
        match ch {
            '%' => prefix.push_str("%25"),
            SEPARATOR => prefix.push_str("%3A"),
            other => prefix.push(other),
        }
    }
    prefix.push(SEPARATOR);
    prefix
}
