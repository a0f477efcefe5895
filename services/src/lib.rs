//! Submission lifecycle and the per-job feedback pipeline.
//!
//! This crate owns every status transition a submission goes through and
//! wires the marshalling/generation/repair chain into the queue's worker
//! seam. No other crate mutates submission status.

pub mod error;
pub mod feedback_service;
pub mod pipeline;
pub mod submission_service;

pub use error::ServiceError;
pub use feedback_service::FeedbackService;
pub use pipeline::FeedbackPipeline;
pub use submission_service::{CreateSubmission, SubmissionService};
