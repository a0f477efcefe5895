use thiserror::Error;

/// Errors produced by the feedback-generation pipeline.
///
/// The worker maps every variant to a job failure; the queue decides whether
/// the job gets another attempt. Nothing here retries beyond the single
/// bounded in-client retry.
#[derive(Debug, Error)]
pub enum AiError {
    /// Submission content could not be read before any provider call.
    #[error("failed to fetch submission content: {0}")]
    ContentFetch(String),

    /// The provider's file-ingestion endpoint rejected the upload.
    #[error("failed to upload content to provider: {0}")]
    ContentUpload(String),

    /// The generation call failed after the bounded retry.
    #[error("generation service error: {0}")]
    GenerationService(String),

    /// Output could not be repaired into parseable JSON.
    #[error("model response is not parseable JSON: {0}")]
    MalformedResponse(String),

    /// Output parsed but does not satisfy the feedback schema.
    #[error("model response failed schema validation: {0}")]
    SchemaValidation(String),
}

impl AiError {
    /// Whether the generation client's single bounded retry applies.
    ///
    /// Only infrastructure-level generation failures are transient at this
    /// layer; everything else propagates to the job queue untouched.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::GenerationService(_))
    }
}
