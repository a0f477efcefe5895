use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced by the job queue.
///
/// An enqueue failure at submit time is a first-class outcome: the caller
/// must mark the submission failed rather than leave it pending forever.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue backend (the shared database) rejected the operation.
    #[error("queue backend error: {0}")]
    Backend(#[from] DbErr),

    /// The referenced job no longer exists.
    #[error("job {0} not found")]
    JobNotFound(i64),
}
