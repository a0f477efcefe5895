//! File ingestion: the single seam through which payload bytes reach the
//! provider's file storage, plus the bounded-lifetime handle cache.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::AiError;

/// Opaque reference to a file already ingested by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Provider-side resource name (e.g. `files/abc123`).
    pub id: String,
    /// URI used to reference the file in generation requests.
    pub uri: String,
}

/// The one interface through which bytes are uploaded out-of-band.
///
/// Exactly one concrete adapter exists per build; no runtime probing of
/// differently-named SDK methods.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<FileHandle, AiError>;
}

/// Uploads through the Gemini media-upload endpoint.
pub struct GeminiFileUploader {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    name: String,
    uri: String,
}

impl GeminiFileUploader {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://generativelanguage.googleapis.com")
    }

    /// Base URL override, used by tests pointing at a local stub.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FileUploader for GeminiFileUploader {
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<FileHandle, AiError> {
        let url = format!("{}/upload/v1beta/files", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| AiError::ContentUpload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::ContentUpload(format!(
                "upload failed with status {}: {}",
                status, body
            )));
        }

        let parsed = response
            .json::<UploadResponse>()
            .await
            .map_err(|e| AiError::ContentUpload(format!("error decoding upload response: {}", e)))?;

        Ok(FileHandle {
            id: parsed.file.name,
            uri: parsed.file.uri,
        })
    }
}

/// In-process cache of uploaded-file handles, keyed by content hash + MIME.
///
/// Entries expire after the TTL (default 45 h, inside the provider's 48 h
/// file validity window). The cache is a pure optimization: callers fall
/// back to a fresh upload on any miss, and a poisoned lock degrades to
/// miss/no-op rather than failing the request.
pub struct UploadCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (FileHandle, DateTime<Utc>)>>,
}

impl UploadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::hours(45))
    }

    pub fn get(&self, key: &str) -> Option<FileHandle> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((handle, stored_at)) if Utc::now() - *stored_at < self.ttl => {
                Some(handle.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, handle: FileHandle) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (handle, Utc::now()));
        }
    }
}
