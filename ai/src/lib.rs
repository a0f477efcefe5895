//! # AI Feedback Generation
//!
//! Everything between a raw submission payload and a validated grading
//! report: content marshalling (inline vs. upload-and-reference), the
//! generation client for the external model service, and repair/validation
//! of the model's structured output.

pub mod client;
pub mod content;
pub mod error;
pub mod repair;
pub mod schema;
pub mod uploader;

pub use client::{GenerationClient, GenerationOutcome, GeminiClient, SamplingConfig, TokenUsage};
pub use content::{ContentPart, ContentSource, Marshaller, should_use_upload};
pub use error::AiError;
pub use repair::{ParseOutcome, parse_structured, repair, validate_feedback};
pub use schema::{GradingFeedback, feedback_response_schema};
pub use uploader::{FileHandle, FileUploader, GeminiFileUploader, UploadCache};
