use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Queue state of a submission-processing job.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_state_enum")]
pub enum JobState {
    /// Eligible to be claimed by a worker
    #[sea_orm(string_value = "waiting")]
    Waiting,
    /// Claimed by a worker, pipeline running
    #[sea_orm(string_value = "active")]
    Active,
    /// Scheduled for a later `run_at` (backoff or delayed enqueue)
    #[sea_orm(string_value = "delayed")]
    Delayed,
    /// Pipeline succeeded (terminal)
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Attempts exhausted, dead-lettered for inspection (terminal)
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Waiting
    }
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state_str = match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        write!(f, "{}", state_str)
    }
}

/// Bookkeeping row for one submission-processing job.
///
/// The payload (`submission_id`) is immutable once enqueued; retries reuse
/// the same row, bumping `attempts` and pushing `run_at` into the future.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    /// Primary key of the job.
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Submission this job processes.
    pub submission_id: i64,
    /// Current queue state.
    pub state: JobState,
    /// Number of attempts started so far.
    pub attempts: i32,
    /// Attempt ceiling; once reached the job is dead-lettered.
    pub max_attempts: i32,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Timestamp when the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the job was last updated.
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::submission::Entity",
        from = "Column::SubmissionId",
        to = "super::submission::Column::Id"
    )]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
