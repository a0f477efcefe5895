//! Submission lifecycle: creation, enqueueing, and every status transition.
//!
//! Status moves `pending → processing → completed | failed`, driven only by
//! the enqueue path and the worker. A submission that cannot be enqueued is
//! marked failed on the spot; it is never left pending with no job behind it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use db::models::submission::{self, ContentKind, SubmissionStatus};
use queue::JobQueue;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::error::ServiceError;

/// Parameters for creating a submission.
#[derive(Debug, Clone)]
pub struct CreateSubmission {
    pub assignment_id: i64,
    pub user_id: i64,
    pub content_kind: ContentKind,
    /// Inline payload for text/code submissions.
    pub content: String,
    /// Raw payload for file submissions, written under the storage root.
    pub file_bytes: Option<Vec<u8>>,
    /// Original filename of a file submission (extension is preserved).
    pub filename: Option<String>,
    pub mime_type: String,
}

/// Owns submission rows and their status transitions.
#[derive(Clone)]
pub struct SubmissionService {
    db: DatabaseConnection,
    queue: JobQueue,
    storage_root: PathBuf,
}

impl SubmissionService {
    pub fn new(db: DatabaseConnection, queue: JobQueue, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            queue,
            storage_root: storage_root.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub async fn get(&self, submission_id: i64) -> Result<submission::Model, ServiceError> {
        submission::Entity::find_by_id(submission_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::SubmissionNotFound(submission_id))
    }

    /// Creates a submission in `pending`. File payloads are written to
    /// `storage_root/assignment_{a}/user_{u}/{id}.{ext}` and the relative
    /// path stored on the row.
    pub async fn create_submission(
        &self,
        params: CreateSubmission,
    ) -> Result<submission::Model, ServiceError> {
        let now = Utc::now();
        let inserted = submission::ActiveModel {
            assignment_id: Set(params.assignment_id),
            user_id: Set(params.user_id),
            content_kind: Set(params.content_kind.clone()),
            content: Set(params.content.clone()),
            file_path: Set(None),
            mime_type: Set(params.mime_type.clone()),
            status: Set(SubmissionStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        let Some(bytes) = params.file_bytes else {
            return Ok(inserted);
        };

        let ext = params
            .filename
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .map(|e| e.to_string_lossy().to_string());
        let stored_filename = match ext {
            Some(ext) => format!("{}.{}", inserted.id, ext),
            None => inserted.id.to_string(),
        };

        let relative_dir = PathBuf::from(format!(
            "assignment_{}/user_{}",
            params.assignment_id, params.user_id
        ));
        let dir_path = self.storage_root.join(&relative_dir);
        std::fs::create_dir_all(&dir_path)
            .map_err(|e| sea_orm::DbErr::Custom(format!("Failed to create directory: {e}")))?;

        let relative_path = relative_dir.join(&stored_filename);
        std::fs::write(self.storage_root.join(&relative_path), bytes)
            .map_err(|e| sea_orm::DbErr::Custom(format!("Failed to write file: {e}")))?;

        let mut model: submission::ActiveModel = inserted.into();
        model.file_path = Set(Some(relative_path.to_string_lossy().to_string()));
        model.updated_at = Set(Utc::now());
        Ok(model.update(&self.db).await?)
    }

    /// Creates a submission and schedules it for processing in one call.
    pub async fn submit_for_processing(
        &self,
        params: CreateSubmission,
    ) -> Result<submission::Model, ServiceError> {
        let created = self.create_submission(params).await?;
        self.enqueue_submission(created.id).await?;
        self.get(created.id).await
    }

    /// Schedules processing for an existing submission.
    ///
    /// If the queue backend is unreachable the submission is marked failed
    /// immediately; a submission must never sit pending with no job behind
    /// it.
    pub async fn enqueue_submission(&self, submission_id: i64) -> Result<(), ServiceError> {
        match self.queue.enqueue(submission_id).await {
            Ok(_) => Ok(()),
            Err(source) => {
                log::error!(
                    "failed to enqueue submission {}: {}; marking failed",
                    submission_id,
                    source
                );
                self.mark_failed(submission_id).await?;
                Err(ServiceError::Enqueue {
                    submission_id,
                    source,
                })
            }
        }
    }

    /// Transitions to `processing` when a worker picks the submission up.
    ///
    /// Allowed from `pending` (first attempt) and from `processing`
    /// (subsequent retry attempts of the same job). Terminal submissions
    /// are never resurrected by a stray worker.
    pub async fn mark_processing(&self, submission_id: i64) -> Result<(), ServiceError> {
        let current = self.get(submission_id).await?;
        match current.status {
            SubmissionStatus::Pending | SubmissionStatus::Processing => {
                self.set_status(current, SubmissionStatus::Processing).await
            }
            status => Err(ServiceError::InvalidTransition(format!(
                "cannot start processing submission {} in status {}",
                submission_id, status
            ))),
        }
    }

    /// Terminal failure: retries exhausted or enqueue impossible.
    pub async fn mark_failed(&self, submission_id: i64) -> Result<(), ServiceError> {
        let current = self.get(submission_id).await?;
        if current.status == SubmissionStatus::Completed {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot fail completed submission {}",
                submission_id
            )));
        }
        self.set_status(current, SubmissionStatus::Failed).await
    }

    /// Operator-triggered reprocessing of a terminal submission.
    ///
    /// Guarded: a non-terminal submission still has (or may have) an active
    /// job, and re-entering processing would duplicate it.
    pub async fn reprocess(&self, submission_id: i64) -> Result<(), ServiceError> {
        let current = self.get(submission_id).await?;
        if !current.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot reprocess submission {} in non-terminal status {}",
                submission_id, current.status
            )));
        }
        self.set_status(current, SubmissionStatus::Pending).await?;
        self.enqueue_submission(submission_id).await
    }

    async fn set_status(
        &self,
        current: submission::Model,
        status: SubmissionStatus,
    ) -> Result<(), ServiceError> {
        let mut active: submission::ActiveModel = current.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }
}
