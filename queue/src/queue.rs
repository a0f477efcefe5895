//! The job queue proper: enqueue with per-submission deduplication, atomic
//! claim, retry scheduling with exponential backoff, dead-lettering, and
//! bookkeeping retention.

use std::time::Duration;

use chrono::Utc;
use common::retry::RetryPolicy;
use db::models::job::{self, JobState};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::error::QueueError;

/// Tuning for retries, backoff and terminal-job retention.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempt ceiling per job.
    pub max_attempts: i32,
    /// Base delay of the exponential backoff schedule (doubles each attempt).
    pub backoff_base: Duration,
    /// How many completed job rows to keep around.
    pub completed_retention: u64,
    /// How many dead-lettered job rows to keep around.
    pub failed_retention: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            completed_retention: 10,
            failed_retention: 5,
        }
    }
}

/// Per-state job counts, for operational monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// What happened to a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-scheduled with backoff; attempts remain.
    Retrying { run_at: chrono::DateTime<Utc> },
    /// Attempts exhausted; retained as a dead letter.
    DeadLettered,
}

/// Handle to the shared job queue.
///
/// Clones share the same backend connection; the queue holds no other state.
#[derive(Clone)]
pub struct JobQueue {
    db: DatabaseConnection,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(db: DatabaseConnection, config: QueueConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueues a processing job for the submission, immediately claimable.
    ///
    /// Deduplicates per submission id: if a non-terminal job already exists
    /// the existing job is returned and nothing new is enqueued, so a
    /// submission never has two jobs in flight. Concurrent enqueues for the
    /// same id are safe: a unique index on live jobs rejects the second
    /// insert, and the loser returns the winner's job.
    pub async fn enqueue(&self, submission_id: i64) -> Result<job::Model, QueueError> {
        self.enqueue_at(submission_id, JobState::Waiting, Utc::now())
            .await
    }

    /// Enqueues a job that only becomes claimable after `delay`.
    pub async fn enqueue_delayed(
        &self,
        submission_id: i64,
        delay: Duration,
    ) -> Result<job::Model, QueueError> {
        let run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self.enqueue_at(submission_id, JobState::Delayed, run_at).await
    }

    async fn enqueue_at(
        &self,
        submission_id: i64,
        state: JobState,
        run_at: chrono::DateTime<Utc>,
    ) -> Result<job::Model, QueueError> {
        if let Some(job) = self.find_live_job(submission_id).await? {
            tracing::debug!(submission_id, job_id = job.id, "job already queued, deduplicated");
            return Ok(job);
        }

        let now = Utc::now();
        let insert_result = job::ActiveModel {
            submission_id: Set(submission_id),
            state: Set(state),
            attempts: Set(0),
            max_attempts: Set(self.config.max_attempts),
            run_at: Set(run_at),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await;

        match insert_result {
            Ok(job) => {
                tracing::info!(submission_id, job_id = job.id, "job enqueued");
                Ok(job)
            }
            Err(err) => {
                // Lost a race against a concurrent enqueue: the unique
                // live-job index rejected this insert after the winner
                // committed, so its job is visible now.
                if let Some(job) = self.find_live_job(submission_id).await? {
                    tracing::debug!(
                        submission_id,
                        job_id = job.id,
                        "lost enqueue race, reusing existing job"
                    );
                    return Ok(job);
                }
                Err(err.into())
            }
        }
    }

    /// The submission's non-terminal job, if one exists.
    async fn find_live_job(&self, submission_id: i64) -> Result<Option<job::Model>, QueueError> {
        Ok(job::Entity::find()
            .filter(job::Column::SubmissionId.eq(submission_id))
            .filter(job::Column::State.is_in([
                JobState::Waiting,
                JobState::Active,
                JobState::Delayed,
            ]))
            .one(&self.db)
            .await?)
    }

    /// Claims the next runnable job, atomically moving it to `active` and
    /// bumping its attempt counter. Returns `None` when nothing is runnable.
    ///
    /// The claim is a conditional update guarded by the job's current state;
    /// when two workers race for the same row, exactly one sees a row
    /// change and the other moves on to the next candidate.
    pub async fn claim_next(&self) -> Result<Option<job::Model>, QueueError> {
        loop {
            let now = Utc::now();
            let candidate = job::Entity::find()
                .filter(
                    job::Column::State.is_in([JobState::Waiting, JobState::Delayed]),
                )
                .filter(job::Column::RunAt.lte(now))
                .order_by_asc(job::Column::RunAt)
                .order_by_asc(job::Column::Id)
                .one(&self.db)
                .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            let claimed = job::Entity::update_many()
                .col_expr(job::Column::State, Expr::value(JobState::Active))
                .col_expr(
                    job::Column::Attempts,
                    Expr::col(job::Column::Attempts).add(1),
                )
                .col_expr(job::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(job::Column::Id.eq(candidate.id))
                .filter(
                    job::Column::State.is_in([JobState::Waiting, JobState::Delayed]),
                )
                .exec(&self.db)
                .await?;

            if claimed.rows_affected == 1 {
                let job = job::Entity::find_by_id(candidate.id)
                    .one(&self.db)
                    .await?
                    .ok_or(QueueError::JobNotFound(candidate.id))?;
                tracing::debug!(
                    job_id = job.id,
                    submission_id = job.submission_id,
                    attempt = job.attempts,
                    "job claimed"
                );
                return Ok(Some(job));
            }
            // Lost the race for this row; try the next candidate.
        }
    }

    /// Marks a job completed and prunes stale bookkeeping.
    pub async fn complete(&self, job_id: i64) -> Result<(), QueueError> {
        let job = job::Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;

        let mut active: job::ActiveModel = job.into();
        active.state = Set(JobState::Completed);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        self.prune().await?;
        Ok(())
    }

    /// Records a failed attempt: re-schedules with backoff while attempts
    /// remain, otherwise dead-letters the job.
    pub async fn fail(&self, job_id: i64, error: &str) -> Result<FailOutcome, QueueError> {
        let job = job::Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;

        let exhausted = job.attempts >= job.max_attempts;
        let mut active: job::ActiveModel = job.clone().into();
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(Utc::now());

        if exhausted {
            active.state = Set(JobState::Failed);
            active.update(&self.db).await?;
            tracing::warn!(
                job_id,
                submission_id = job.submission_id,
                attempts = job.attempts,
                "job dead-lettered: {error}"
            );
            self.prune().await?;
            return Ok(FailOutcome::DeadLettered);
        }

        let backoff =
            RetryPolicy::exponential(job.max_attempts as u32, self.config.backoff_base);
        let delay = backoff.delay_after(job.attempts as u32);
        let run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

        active.state = Set(JobState::Delayed);
        active.run_at = Set(run_at);
        active.update(&self.db).await?;
        tracing::info!(
            job_id,
            submission_id = job.submission_id,
            attempt = job.attempts,
            retry_in_ms = delay.as_millis() as u64,
            "job failed, retry scheduled: {error}"
        );
        Ok(FailOutcome::Retrying { run_at })
    }

    /// Per-state job counts.
    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let count_state = |state: JobState| {
            job::Entity::find()
                .filter(job::Column::State.eq(state))
                .count(&self.db)
        };

        Ok(QueueCounts {
            waiting: count_state(JobState::Waiting).await?,
            active: count_state(JobState::Active).await?,
            delayed: count_state(JobState::Delayed).await?,
            completed: count_state(JobState::Completed).await?,
            failed: count_state(JobState::Failed).await?,
        })
    }

    /// Deletes terminal job rows beyond the configured retention counts.
    async fn prune(&self) -> Result<(), QueueError> {
        self.prune_state(JobState::Completed, self.config.completed_retention)
            .await?;
        self.prune_state(JobState::Failed, self.config.failed_retention)
            .await
    }

    async fn prune_state(&self, state: JobState, keep: u64) -> Result<(), QueueError> {
        let stale: Vec<i64> = job::Entity::find()
            .filter(job::Column::State.eq(state))
            .order_by_desc(job::Column::UpdatedAt)
            .order_by_desc(job::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .skip(keep as usize)
            .map(|j| j.id)
            .collect();

        if !stale.is_empty() {
            job::Entity::delete_many()
                .filter(job::Column::Id.is_in(stale))
                .exec(&self.db)
                .await?;
        }
        Ok(())
    }
}
