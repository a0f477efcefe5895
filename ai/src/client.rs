//! Generation Client Adapter: structured-output requests against the
//! external model service.
//!
//! The adapter owns exactly one bounded retry (a second attempt on
//! transient failures); anything broader is the job queue's business.
//! Content bodies are never logged here, only lengths and token usage.

use async_trait::async_trait;
use common::retry::{RetryPolicy, run_with_retry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::content::ContentPart;
use crate::error::AiError;

/// Sampling parameters for reproducible grading output.
///
/// Deliberately low-temperature; grading is not creative generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// Token accounting reported by the provider, when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
}

/// Raw result of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Extracted candidate text, or the serialized response body when the
    /// expected structure was absent. Interpretation belongs to the
    /// repair/validation step, not here.
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// The external generation service, abstracted for the pipeline and tests.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        parts: &[ContentPart],
        system_instruction: Option<&str>,
        output_schema: &Value,
    ) -> Result<GenerationOutcome, AiError>;
}

#[async_trait]
impl<T: GenerationClient + ?Sized> GenerationClient for std::sync::Arc<T> {
    async fn generate(
        &self,
        parts: &[ContentPart],
        system_instruction: Option<&str>,
        output_schema: &Value,
    ) -> Result<GenerationOutcome, AiError> {
        (**self).generate(parts, system_instruction, output_schema).await
    }
}

/// Request body for the Gemini API.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    /// The content to send to the model.
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

/// Content wrapper for the Gemini API request.
#[derive(Serialize)]
struct Content {
    /// The parts of the message (text, inline bytes, or file references).
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineBlob,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineBlob {
    mime_type: String,
    /// Base64-encoded payload.
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

/// Generation parameters: fixed sampling plus the structured-output constraint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: i32,
    max_output_tokens: u32,
    response_mime_type: String,
    response_schema: Value,
}

/// Response from the Gemini API.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    /// List of candidate completions from the model.
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

/// One failed call, classified for the bounded retry.
#[derive(Debug)]
enum CallError {
    /// Network error, timeout, rate limit, or provider-side 5xx.
    Transient(String),
    /// Invalid request, auth failure, permanent quota exhaustion.
    Fatal(String),
}

impl CallError {
    fn message(self) -> String {
        match self {
            CallError::Transient(m) | CallError::Fatal(m) => m,
        }
    }
}

/// Concrete adapter for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    sampling: SamplingConfig,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base_url(
            api_key,
            model,
            timeout,
            "https://generativelanguage.googleapis.com",
        )
    }

    /// Base URL override, used by tests pointing at a local stub.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            // The generation call can legitimately run for tens of seconds;
            // this timeout is independent of any HTTP-facing request timeout.
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build HTTP client"),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            sampling: SamplingConfig::default(),
            retry: RetryPolicy::immediate(2),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    fn build_request(
        &self,
        parts: &[ContentPart],
        system_instruction: Option<&str>,
        output_schema: &Value,
    ) -> GeminiRequest {
        let request_parts = parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => RequestPart::Text { text: text.clone() },
                ContentPart::InlineData { mime_type, data } => RequestPart::Inline {
                    inline_data: InlineBlob {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    },
                },
                ContentPart::FileRef { handle, mime_type } => RequestPart::File {
                    file_data: FileData {
                        mime_type: mime_type.clone(),
                        file_uri: handle.clone(),
                    },
                },
            })
            .collect();

        GeminiRequest {
            contents: vec![Content {
                parts: request_parts,
            }],
            system_instruction: system_instruction.map(|text| Content {
                parts: vec![RequestPart::Text {
                    text: text.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: self.sampling.temperature,
                top_p: self.sampling.top_p,
                top_k: self.sampling.top_k,
                max_output_tokens: self.sampling.max_output_tokens,
                response_mime_type: "application/json".to_string(),
                response_schema: output_schema.clone(),
            },
        }
    }

    async fn call_once(&self, body: &GeminiRequest) -> Result<String, CallError> {
        // The key travels as a header rather than a query parameter so it
        // never appears in request URLs echoed back through error strings.
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        if status.is_success() {
            return Ok(text);
        }

        let message = format!("provider returned {}: {}", status, text);
        if status.as_u16() == 429 || status.is_server_error() {
            Err(CallError::Transient(message))
        } else {
            Err(CallError::Fatal(message))
        }
    }

    fn extract(&self, body: &str) -> GenerationOutcome {
        let parsed: Result<GeminiResponse, _> = serde_json::from_str(body);
        let response = match parsed {
            Ok(response) => response,
            // No recognizable structure at all: hand the raw body to the
            // repair step as a diagnostic string rather than failing here.
            Err(_) => {
                return GenerationOutcome {
                    text: body.to_string(),
                    finish_reason: None,
                    usage: None,
                };
            }
        };

        let usage = response.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            response_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let first = response.candidates.into_iter().next();
        let finish_reason = first.as_ref().and_then(|c| c.finish_reason.clone());
        let text = first
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            // Expected structure absent: fall back to the whole body.
            .unwrap_or_else(|| body.to_string());

        GenerationOutcome {
            text,
            finish_reason,
            usage,
        }
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        parts: &[ContentPart],
        system_instruction: Option<&str>,
        output_schema: &Value,
    ) -> Result<GenerationOutcome, AiError> {
        let body = self.build_request(parts, system_instruction, output_schema);
        let prompt_len: usize = parts
            .iter()
            .map(|p| match p {
                ContentPart::Text(t) => t.len(),
                ContentPart::InlineData { data, .. } => data.len(),
                ContentPart::FileRef { .. } => 0,
            })
            .sum();

        let raw = run_with_retry(
            self.retry,
            |err: &CallError| matches!(err, CallError::Transient(_)),
            || self.call_once(&body),
        )
        .await
        .map_err(|err| AiError::GenerationService(err.message()))?;

        let outcome = self.extract(&raw);
        tracing::info!(
            model = %self.model,
            prompt_len,
            response_len = outcome.text.len(),
            finish_reason = outcome.finish_reason.as_deref().unwrap_or("unknown"),
            prompt_tokens = outcome.usage.map(|u| u.prompt_tokens).unwrap_or(0),
            response_tokens = outcome.usage.map(|u| u.response_tokens).unwrap_or(0),
            "generation call finished"
        );

        Ok(outcome)
    }
}
