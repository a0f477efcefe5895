use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Represents the status of a submission throughout its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "submission_status_enum"
)]
pub enum SubmissionStatus {
    /// Accepted, waiting to be picked up by a worker
    #[sea_orm(string_value = "pending")]
    Pending,
    /// A worker is generating feedback for it
    #[sea_orm(string_value = "processing")]
    Processing,
    /// Feedback generated and attached (terminal)
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Retries exhausted or could not be queued (terminal)
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubmissionStatus {
    /// Terminal statuses are never left except through an explicit
    /// operator-triggered reprocess.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status_str = match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        };
        write!(f, "{}", status_str)
    }
}

/// What kind of payload the submission carries.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "content_kind_enum"
)]
pub enum ContentKind {
    /// Free-form text answer, stored in `content`
    #[sea_orm(string_value = "text")]
    Text,
    /// Uploaded file, stored on disk at `file_path`
    #[sea_orm(string_value = "file")]
    File,
    /// Inline source code, stored in `content`
    #[sea_orm(string_value = "code")]
    Code,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind_str = match self {
            ContentKind::Text => "text",
            ContentKind::File => "file",
            ContentKind::Code => "code",
        };
        write!(f, "{}", kind_str)
    }
}

/// A student's submission awaiting (or holding) AI-generated feedback.
///
/// The status column is mutated only by the enqueue path and the worker;
/// terminal submissions are immutable except for operator reprocessing.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    /// Primary key of the submission.
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the related assignment.
    pub assignment_id: i64,
    /// ID of the user who submitted.
    pub user_id: i64,
    /// Payload kind (text, file, code).
    pub content_kind: ContentKind,
    /// Inline payload for text/code submissions; empty for file submissions.
    pub content: String,
    /// Stored file path for file submissions, relative to the storage root.
    pub file_path: Option<String>,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Current status of the submission in the lifecycle.
    pub status: SubmissionStatus,
    /// Timestamp when the submission was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the submission was last updated.
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::feedback::Entity")]
    Feedback,
    #[sea_orm(has_many = "super::job::Entity")]
    Job,
}

impl Related<super::feedback::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Feedback.def()
    }
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
