//! Feedback persistence: the atomic "attach report + complete submission"
//! step, and reads of the current report.

use ai::GradingFeedback;
use chrono::Utc;
use db::models::feedback;
use db::models::submission::{self, SubmissionStatus};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::error::ServiceError;

/// Owns feedback report rows. Reports are append-only: reprocessing
/// supersedes the old report in the same transaction that inserts the new
/// one.
#[derive(Clone)]
pub struct FeedbackService {
    db: DatabaseConnection,
}

impl FeedbackService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persists a validated report and flips the submission to `completed`
    /// in a single transaction, so a report never exists without the
    /// completed status or vice versa.
    pub async fn attach_report(
        &self,
        submission_id: i64,
        grading: &GradingFeedback,
        raw_response: &str,
        model: &str,
        processing_ms: i64,
    ) -> Result<feedback::Model, ServiceError> {
        let submission = submission::Entity::find_by_id(submission_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::SubmissionNotFound(submission_id))?;

        if submission.status == SubmissionStatus::Failed {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot attach feedback to failed submission {}",
                submission_id
            )));
        }

        let txn = self.db.begin().await?;

        // A previous report (operator reprocess) gets superseded, never mutated.
        feedback::Entity::update_many()
            .col_expr(feedback::Column::Superseded, Expr::value(true))
            .filter(feedback::Column::SubmissionId.eq(submission_id))
            .filter(feedback::Column::Superseded.eq(false))
            .exec(&txn)
            .await?;

        let report = feedback::ActiveModel {
            submission_id: Set(submission_id),
            overall_score: Set(grading.score),
            summary: Set(grading.summary.clone()),
            strengths: Set(serde_json::json!(grading.strengths)),
            improvements: Set(serde_json::json!(grading.improvements)),
            suggestions: Set(serde_json::json!(grading.suggestions)),
            criterion_scores: Set(serde_json::to_value(&grading.criterion_scores)
                .unwrap_or_else(|_| serde_json::json!([]))),
            raw_response: Set(raw_response.to_string()),
            model: Set(model.to_string()),
            processing_ms: Set(processing_ms),
            superseded: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut active: submission::ActiveModel = submission.into();
        active.status = Set(SubmissionStatus::Completed);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;
        log::info!(
            "attached feedback report {} to submission {} (score {})",
            report.id,
            submission_id,
            report.overall_score
        );
        Ok(report)
    }

    /// The current (non-superseded) report for a submission, if any.
    pub async fn current_report(
        &self,
        submission_id: i64,
    ) -> Result<Option<feedback::Model>, ServiceError> {
        Ok(feedback::Entity::find()
            .filter(feedback::Column::SubmissionId.eq(submission_id))
            .filter(feedback::Column::Superseded.eq(false))
            .one(&self.db)
            .await?)
    }
}
