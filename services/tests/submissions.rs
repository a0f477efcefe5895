//! Submission state-machine and enqueue-path tests.

use std::time::Duration;

use ai::GradingFeedback;
use db::models::submission::{ContentKind, SubmissionStatus};
use db::test_utils::setup_test_db;
use queue::{JobQueue, QueueConfig};
use sea_orm::Database;
use services::{CreateSubmission, FeedbackService, ServiceError, SubmissionService};

fn text_submission(content: &str) -> CreateSubmission {
    CreateSubmission {
        assignment_id: 1,
        user_id: 7,
        content_kind: ContentKind::Text,
        content: content.to_string(),
        file_bytes: None,
        filename: None,
        mime_type: "text/plain".to_string(),
    }
}

fn queue_config() -> QueueConfig {
    QueueConfig {
        max_attempts: 3,
        backoff_base: Duration::ZERO,
        completed_retention: 10,
        failed_retention: 5,
    }
}

fn grading(score: f64) -> GradingFeedback {
    GradingFeedback {
        summary: "Correct arithmetic.".to_string(),
        score,
        strengths: vec!["right answer".to_string()],
        improvements: vec![],
        suggestions: vec![],
        criterion_scores: vec![],
    }
}

async fn service_stack() -> (SubmissionService, FeedbackService, JobQueue, tempfile::TempDir) {
    let db = setup_test_db().await;
    let queue = JobQueue::new(db.clone(), queue_config());
    let storage = tempfile::tempdir().expect("failed to create storage dir");
    let submissions = SubmissionService::new(db.clone(), queue.clone(), storage.path());
    let feedback = FeedbackService::new(db);
    (submissions, feedback, queue, storage)
}

#[tokio::test]
async fn created_submissions_start_pending() {
    let (submissions, _, _, _storage) = service_stack().await;

    let created = submissions
        .create_submission(text_submission("2+2=4"))
        .await
        .unwrap();

    assert_eq!(created.status, SubmissionStatus::Pending);
    assert_eq!(created.content, "2+2=4");
    assert!(created.file_path.is_none());
}

#[tokio::test]
async fn file_submissions_are_written_under_the_storage_root() {
    let (submissions, _, _, storage) = service_stack().await;

    let created = submissions
        .create_submission(CreateSubmission {
            content_kind: ContentKind::File,
            content: String::new(),
            file_bytes: Some(b"%PDF-1.4 fake".to_vec()),
            filename: Some("essay.pdf".to_string()),
            mime_type: "application/pdf".to_string(),
            ..text_submission("")
        })
        .await
        .unwrap();

    let relative = created.file_path.expect("file path must be stored");
    assert!(relative.ends_with(&format!("{}.pdf", created.id)));
    let stored = std::fs::read(storage.path().join(&relative)).unwrap();
    assert_eq!(stored, b"%PDF-1.4 fake");
}

#[tokio::test]
async fn submit_for_processing_enqueues_exactly_one_job() {
    let (submissions, _, queue, _storage) = service_stack().await;

    let created = submissions
        .submit_for_processing(text_submission("2+2=4"))
        .await
        .unwrap();

    assert_eq!(created.status, SubmissionStatus::Pending);
    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.waiting, 1);

    // A second enqueue for the same submission is deduplicated.
    submissions.enqueue_submission(created.id).await.unwrap();
    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.waiting, 1);
}

#[tokio::test]
async fn enqueue_failure_marks_the_submission_failed() {
    let db = setup_test_db().await;
    // A queue over a database without the jobs table: every enqueue fails,
    // simulating an unreachable queue backend at submit time.
    let broken_backend = Database::connect("sqlite::memory:").await.unwrap();
    let broken_queue = JobQueue::new(broken_backend, queue_config());
    let storage = tempfile::tempdir().unwrap();
    let submissions = SubmissionService::new(db, broken_queue, storage.path());

    let err = submissions
        .submit_for_processing(text_submission("2+2=4"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Enqueue { .. }));

    // The submission must not be left pending forever.
    let all = submissions.get(1).await.unwrap();
    assert_eq!(all.status, SubmissionStatus::Failed);
}

#[tokio::test]
async fn processing_transition_is_guarded() {
    let (submissions, feedback, _, _storage) = service_stack().await;
    let created = submissions
        .create_submission(text_submission("2+2=4"))
        .await
        .unwrap();

    // pending -> processing, and processing -> processing for retries.
    submissions.mark_processing(created.id).await.unwrap();
    submissions.mark_processing(created.id).await.unwrap();

    feedback
        .attach_report(created.id, &grading(90.0), "{}", "test-model", 5)
        .await
        .unwrap();

    // Terminal submissions cannot re-enter processing or fail.
    assert!(matches!(
        submissions.mark_processing(created.id).await,
        Err(ServiceError::InvalidTransition(_))
    ));
    assert!(matches!(
        submissions.mark_failed(created.id).await,
        Err(ServiceError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn completion_attaches_report_and_status_atomically() {
    let (submissions, feedback, _, _storage) = service_stack().await;
    let created = submissions
        .create_submission(text_submission("2+2=4"))
        .await
        .unwrap();
    submissions.mark_processing(created.id).await.unwrap();

    assert!(feedback.current_report(created.id).await.unwrap().is_none());

    feedback
        .attach_report(created.id, &grading(90.0), r#"{"score":90}"#, "test-model", 42)
        .await
        .unwrap();

    // completed iff a current report exists.
    let updated = submissions.get(created.id).await.unwrap();
    assert_eq!(updated.status, SubmissionStatus::Completed);
    let report = feedback.current_report(created.id).await.unwrap().unwrap();
    assert_eq!(report.overall_score, 90.0);
    assert_eq!(report.model, "test-model");
    assert_eq!(report.processing_ms, 42);
    assert_eq!(report.raw_response, r#"{"score":90}"#);
}

#[tokio::test]
async fn reports_cannot_attach_to_failed_submissions() {
    let (submissions, feedback, _, _storage) = service_stack().await;
    let created = submissions
        .create_submission(text_submission("2+2=4"))
        .await
        .unwrap();
    submissions.mark_failed(created.id).await.unwrap();

    assert!(matches!(
        feedback
            .attach_report(created.id, &grading(50.0), "{}", "test-model", 1)
            .await,
        Err(ServiceError::InvalidTransition(_))
    ));
    assert!(feedback.current_report(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn reprocess_requires_a_terminal_submission() {
    let (submissions, feedback, queue, _storage) = service_stack().await;
    let created = submissions
        .create_submission(text_submission("2+2=4"))
        .await
        .unwrap();

    assert!(matches!(
        submissions.reprocess(created.id).await,
        Err(ServiceError::InvalidTransition(_))
    ));

    feedback
        .attach_report(created.id, &grading(90.0), "{}", "test-model", 5)
        .await
        .unwrap();

    submissions.reprocess(created.id).await.unwrap();
    let updated = submissions.get(created.id).await.unwrap();
    assert_eq!(updated.status, SubmissionStatus::Pending);
    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.waiting, 1);
}

#[tokio::test]
async fn reprocessing_supersedes_the_previous_report() {
    let (submissions, feedback, _, _storage) = service_stack().await;
    let created = submissions
        .create_submission(text_submission("2+2=4"))
        .await
        .unwrap();

    feedback
        .attach_report(created.id, &grading(90.0), "{}", "test-model", 5)
        .await
        .unwrap();
    feedback
        .attach_report(created.id, &grading(70.0), "{}", "test-model", 5)
        .await
        .unwrap();

    let current = feedback.current_report(created.id).await.unwrap().unwrap();
    assert_eq!(current.overall_score, 70.0);
}
