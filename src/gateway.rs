//! File Listing Gateway Client
//!
//! Fetches a user's uploaded files from the upstream listing gateway. This is
//! the fetch that sits behind the response cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::FetchError;

// == File Item ==
/// One file as reported by the gateway. Unknown fields are carried through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "originalS3Key")]
    pub original_s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "s3Key")]
    pub s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileItem {
    /// Folder placeholders have a blank name or a key ending in `/`.
    pub fn is_folder(&self) -> bool {
        let blank_name = self
            .file_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty());
        let folder_key = self
            .original_s3_key
            .as_deref()
            .is_some_and(|key| key.ends_with('/'));
        blank_name || folder_key
    }

    fn is_listable(&self) -> bool {
        let named = self.file_name.is_some() || self.original_s3_key.is_some();
        named && !self.is_folder()
    }

    /// Whether this file was uploaded in `session_id`.
    pub fn belongs_to_session(&self, session_id: &str) -> bool {
        let segment = format!("/{session_id}/");
        self.session_id.as_deref() == Some(session_id)
            || self.s3_key.as_deref().is_some_and(|key| key.contains(&segment))
            || self.key.as_deref().is_some_and(|key| key.contains(&segment))
    }
}

// == File Listing ==
/// Cached result of one gateway call. The default value is the empty listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileListing {
    pub items: Vec<FileItem>,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    files: Vec<FileItem>,
}

/// Files from `items` that belong to `session_id`.
pub fn filter_session_files(items: &[FileItem], session_id: &str) -> Vec<FileItem> {
    items
        .iter()
        .filter(|item| item.belongs_to_session(session_id))
        .cloned()
        .collect()
}

// == Gateway Client ==
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    files_url: String,
}

impl GatewayClient {
    pub fn new(files_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), files_url)
    }

    pub fn with_client(http: reqwest::Client, files_url: impl Into<String>) -> Self {
        Self {
            http,
            files_url: files_url.into(),
        }
    }

    /// Lists the caller's files. The cache bounds the call with its fetch timeout.
    pub async fn fetch_files(&self, token: Option<String>) -> Result<FileListing, FetchError> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| FetchError::MissingCredentials("no access token available".to_string()))?;

        debug!(url = %self.files_url, "requesting file listing from gateway");
        let response = self
            .http
            .get(&self.files_url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| FetchError::Upstream(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream(format!("gateway answered {status}")));
        }

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|err| FetchError::Decode(err.to_string()))?;

        Ok(listing_from(body))
    }
}

fn listing_from(body: GatewayResponse) -> FileListing {
    let total = body.files.len();
    let items: Vec<FileItem> = body.files.into_iter().filter(FileItem::is_listable).collect();
    info!(total, kept = items.len(), "received file listing from gateway");

    FileListing {
        items,
        fetched_at: Some(Utc::now()),
    }
}
