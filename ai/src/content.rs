//! Content marshalling: turning raw submission payloads into the ordered
//! list of [`ContentPart`]s sent to the generation service.
//!
//! The inline-vs-upload decision is a pure function of MIME type and size.
//! Document, audio and video formats always go through the provider's file
//! ingestion; images are uploaded only past a size threshold; everything
//! else is inlined. Very large plain text is inlined as-is and not chunked,
//! a known limitation.

use std::path::PathBuf;

use base64::{Engine as _, engine::general_purpose};
use common::retry::{RetryPolicy, run_with_retry};
use sha2::{Digest, Sha256};

use crate::error::AiError;
use crate::uploader::{FileUploader, UploadCache};

/// Default inline threshold for raster images: 5 MiB.
pub const INLINE_IMAGE_LIMIT_BYTES: u64 = 5 * 1024 * 1024;

/// Document-family MIME types that must always be uploaded.
const DOCUMENT_MIME_PREFIXES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument",
    "application/vnd.ms-word",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/vnd.oasis.opendocument",
    "application/rtf",
];

/// One unit of multimodal content for a generation request.
///
/// Constructed per call from submission content and discarded afterwards;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    /// Plain text span.
    Text(String),
    /// Base64-encoded bytes embedded directly in the request.
    InlineData { mime_type: String, data: String },
    /// Reference to a previously uploaded file.
    FileRef { handle: String, mime_type: String },
}

/// Raw submission content handed to the marshaller.
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// Free-form text (or inline code), sent verbatim.
    Text(String),
    /// In-memory payload with its MIME type.
    Bytes { bytes: Vec<u8>, mime_type: String },
    /// Payload stored on local disk.
    LocalFile { path: PathBuf, mime_type: String },
}

/// Decides whether a payload goes through upload-and-reference.
///
/// Pure and deterministic: document/audio/video formats and SVG always
/// upload; raster images upload only above the threshold; everything else
/// (text, JSON, generic binary) is inlined regardless of size.
pub fn should_use_upload(mime_type: &str, size_bytes: u64) -> bool {
    upload_policy(mime_type, size_bytes, INLINE_IMAGE_LIMIT_BYTES)
}

fn upload_policy(mime_type: &str, size_bytes: u64, inline_image_limit: u64) -> bool {
    let mime = mime_type.to_ascii_lowercase();

    if DOCUMENT_MIME_PREFIXES.iter().any(|p| mime.starts_with(p)) || mime.contains("document") {
        return true;
    }
    // Vector images cannot be inlined as raster data.
    if mime == "image/svg+xml" {
        return true;
    }
    if mime.starts_with("audio/") || mime.starts_with("video/") {
        return true;
    }
    if mime.starts_with("image/") {
        return size_bytes > inline_image_limit;
    }
    false
}

/// Transforms submission content into provider-agnostic [`ContentPart`]s.
pub struct Marshaller<U: FileUploader> {
    uploader: U,
    cache: UploadCache,
    inline_image_limit: u64,
    upload_retry: RetryPolicy,
}

impl<U: FileUploader> Marshaller<U> {
    pub fn new(uploader: U, cache: UploadCache) -> Self {
        Self {
            uploader,
            cache,
            inline_image_limit: INLINE_IMAGE_LIMIT_BYTES,
            upload_retry: RetryPolicy::immediate(2),
        }
    }

    pub fn with_inline_image_limit(mut self, limit_bytes: u64) -> Self {
        self.inline_image_limit = limit_bytes;
        self
    }

    /// Converts each source into a content part, uploading where the policy
    /// demands it. Fails with [`AiError::ContentFetch`] before any provider
    /// call if a source cannot be read.
    pub async fn marshal(&self, sources: Vec<ContentSource>) -> Result<Vec<ContentPart>, AiError> {
        let mut parts = Vec::with_capacity(sources.len());
        for source in sources {
            parts.push(self.marshal_one(source).await?);
        }
        Ok(parts)
    }

    async fn marshal_one(&self, source: ContentSource) -> Result<ContentPart, AiError> {
        let (bytes, mime_type) = match source {
            ContentSource::Text(text) => return Ok(ContentPart::Text(text)),
            ContentSource::Bytes { bytes, mime_type } => (bytes, mime_type),
            ContentSource::LocalFile { path, mime_type } => {
                let bytes = std::fs::read(&path)
                    .map_err(|e| AiError::ContentFetch(format!("{}: {}", path.display(), e)))?;
                (bytes, mime_type)
            }
        };

        if upload_policy(&mime_type, bytes.len() as u64, self.inline_image_limit) {
            let handle = self.upload_with_cache(&bytes, &mime_type).await?;
            Ok(ContentPart::FileRef {
                handle,
                mime_type,
            })
        } else {
            Ok(ContentPart::InlineData {
                data: general_purpose::STANDARD.encode(&bytes),
                mime_type,
            })
        }
    }

    /// Uploads the payload, consulting the handle cache first. Cache misses
    /// and cache errors both degrade to a fresh upload; only the upload
    /// itself can fail the request.
    async fn upload_with_cache(&self, bytes: &[u8], mime_type: &str) -> Result<String, AiError> {
        let key = cache_key(bytes, mime_type);

        if let Some(handle) = self.cache.get(&key) {
            tracing::debug!(mime_type, "upload cache hit, reusing file handle");
            return Ok(handle.uri);
        }

        let handle = run_with_retry(self.upload_retry, AiError::is_transient_upload, || {
            self.uploader.upload(bytes, mime_type)
        })
        .await?;

        tracing::info!(mime_type, size = bytes.len(), "uploaded content to provider");
        self.cache.put(key, handle.clone());
        Ok(handle.uri)
    }
}

impl AiError {
    fn is_transient_upload(&self) -> bool {
        matches!(self, AiError::ContentUpload(_))
    }
}

fn cache_key(bytes: &[u8], mime_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{}:{}", hex::encode(hasher.finalize()), mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::FileHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    #[test]
    fn upload_policy_table() {
        let cases: &[(&str, u64, bool)] = &[
            ("application/pdf", KB, true),
            ("application/msword", 10 * KB, true),
            (
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                KB,
                true,
            ),
            ("application/vnd.ms-excel", 200 * KB, true),
            ("image/svg+xml", KB, true),
            ("audio/mpeg", KB, true),
            ("video/mp4", KB, true),
            ("image/png", 100 * KB, false),
            ("image/png", 10 * MB, true),
            ("image/jpeg", 5 * MB, false),
            ("text/plain", 10 * MB, false),
            ("application/json", 20 * MB, false),
            ("application/octet-stream", 100 * MB, false),
        ];

        for (mime, size, expected) in cases {
            assert_eq!(
                should_use_upload(mime, *size),
                *expected,
                "policy mismatch for ({}, {})",
                mime,
                size
            );
        }
    }

    struct CountingUploader {
        calls: AtomicUsize,
        failures_before_success: Mutex<usize>,
    }

    impl CountingUploader {
        fn new(failures_before_success: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success: Mutex::new(failures_before_success),
            }
        }
    }

    #[async_trait]
    impl FileUploader for CountingUploader {
        async fn upload(&self, _bytes: &[u8], mime_type: &str) -> Result<FileHandle, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut remaining = self.failures_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AiError::ContentUpload("provider unavailable".into()));
            }
            Ok(FileHandle {
                id: "files/abc123".into(),
                uri: format!("https://provider.example/files/abc123/{}", mime_type),
            })
        }
    }

    #[tokio::test]
    async fn text_sources_pass_through() {
        let marshaller = Marshaller::new(CountingUploader::new(0), UploadCache::with_default_ttl());
        let parts = marshaller
            .marshal(vec![ContentSource::Text("2+2=4".into())])
            .await
            .unwrap();
        assert_eq!(parts, vec![ContentPart::Text("2+2=4".into())]);
    }

    #[tokio::test]
    async fn local_files_are_read_and_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.txt");
        std::fs::write(&path, "2+2=4").unwrap();

        let marshaller = Marshaller::new(CountingUploader::new(0), UploadCache::with_default_ttl());
        let parts = marshaller
            .marshal(vec![ContentSource::LocalFile {
                path,
                mime_type: "text/plain".into(),
            }])
            .await
            .unwrap();

        match &parts[0] {
            ContentPart::InlineData { mime_type, data } => {
                assert_eq!(mime_type, "text/plain");
                assert_eq!(data, &general_purpose::STANDARD.encode("2+2=4"));
            }
            other => panic!("expected inline data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn small_images_are_inlined() {
        let marshaller = Marshaller::new(CountingUploader::new(0), UploadCache::with_default_ttl());
        let parts = marshaller
            .marshal(vec![ContentSource::Bytes {
                bytes: vec![0u8; 16],
                mime_type: "image/png".into(),
            }])
            .await
            .unwrap();

        match &parts[0] {
            ContentPart::InlineData { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, &general_purpose::STANDARD.encode(vec![0u8; 16]));
            }
            other => panic!("expected inline data, got {:?}", other),
        }
        assert_eq!(marshaller.uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn documents_use_the_upload_path() {
        let marshaller = Marshaller::new(CountingUploader::new(0), UploadCache::with_default_ttl());
        let parts = marshaller
            .marshal(vec![ContentSource::Bytes {
                bytes: b"%PDF-1.4".to_vec(),
                mime_type: "application/pdf".into(),
            }])
            .await
            .unwrap();

        assert!(matches!(parts[0], ContentPart::FileRef { .. }));
        assert_eq!(marshaller.uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn identical_content_reuses_cached_handle() {
        let marshaller = Marshaller::new(CountingUploader::new(0), UploadCache::with_default_ttl());
        let source = ContentSource::Bytes {
            bytes: b"%PDF-1.4".to_vec(),
            mime_type: "application/pdf".into(),
        };

        marshaller.marshal(vec![source.clone()]).await.unwrap();
        marshaller.marshal(vec![source]).await.unwrap();

        assert_eq!(marshaller.uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upload_is_retried_once_then_fails() {
        let marshaller = Marshaller::new(CountingUploader::new(2), UploadCache::with_default_ttl());
        let err = marshaller
            .marshal(vec![ContentSource::Bytes {
                bytes: b"%PDF-1.4".to_vec(),
                mime_type: "application/pdf".into(),
            }])
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::ContentUpload(_)));
        assert_eq!(marshaller.uploader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_local_file_is_a_fetch_error() {
        let marshaller = Marshaller::new(CountingUploader::new(0), UploadCache::with_default_ttl());
        let err = marshaller
            .marshal(vec![ContentSource::LocalFile {
                path: PathBuf::from("/nonexistent/submission.bin"),
                mime_type: "application/octet-stream".into(),
            }])
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::ContentFetch(_)));
        assert_eq!(marshaller.uploader.calls.load(Ordering::SeqCst), 0);
    }
}
