use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// One AI-generated grading report for a submission.
///
/// Reports are never mutated. Reprocessing flips `superseded` on the old row
/// and inserts a fresh one, so at most one current report exists per
/// submission, and a current report exists iff the submission is completed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "feedback_reports")]
pub struct Model {
    /// Primary key of the report.
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Submission this report belongs to.
    pub submission_id: i64,
    /// Overall score in 0..=100.
    pub overall_score: f64,
    /// Model-written summary of the submission.
    pub summary: String,
    /// JSON array of strengths.
    pub strengths: Json,
    /// JSON array of areas to improve.
    pub improvements: Json,
    /// JSON array of concrete suggestions.
    pub suggestions: Json,
    /// JSON array of per-criterion scores.
    pub criterion_scores: Json,
    /// Verbatim model output, kept for audit.
    pub raw_response: String,
    /// Identifier of the model that produced the report.
    pub model: String,
    /// Wall-clock processing duration in milliseconds.
    pub processing_ms: i64,
    /// Whether a later report replaced this one.
    pub superseded: bool,
    /// Timestamp when the report was created.
    pub created_at: DateTime<Utc>,
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
