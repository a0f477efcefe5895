use ai::AiError;
use queue::QueueError;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced by the submission/feedback services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("submission {0} not found")]
    SubmissionNotFound(i64),

    /// A status transition the state machine does not allow.
    #[error("invalid submission transition: {0}")]
    InvalidTransition(String),

    /// The submission could not be scheduled for processing at all.
    /// The submission is marked failed before this is returned.
    #[error("failed to enqueue submission {submission_id}: {source}")]
    Enqueue {
        submission_id: i64,
        #[source]
        source: QueueError,
    },

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error(transparent)]
    Ai(#[from] AiError),
}
