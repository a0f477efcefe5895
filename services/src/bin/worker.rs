//! Worker daemon: connects to the database and drives the feedback
//! pipeline until interrupted.
//!
//! The schema is expected to be in place (`cargo run -p migration` first).

use std::sync::Arc;
use std::time::Duration;

use ai::{GeminiClient, GeminiFileUploader, Marshaller, SamplingConfig, UploadCache};
use common::config::AppConfig;
use common::logger::init_logger;
use queue::{JobQueue, QueueConfig, WorkerPool};
use services::{FeedbackPipeline, FeedbackService, SubmissionService};

#[tokio::main]
async fn main() {
    let config = AppConfig::global().clone();
    // The queue and ai crates emit through `tracing`; its log bridge routes
    // those records into this dispatch, so one logger covers everything.
    init_logger(&config.log_level, &config.log_file, config.log_to_stdout);

    if config.gemini_api_key.is_empty() {
        log::warn!("GEMINI_API_KEY is not set; generation calls will be rejected");
    }

    let db = db::connect(&config.database_path)
        .await
        .expect("failed to connect to database");

    let queue = JobQueue::new(
        db.clone(),
        QueueConfig {
            max_attempts: config.job_max_attempts as i32,
            backoff_base: Duration::from_secs(config.job_backoff_base_secs),
            completed_retention: config.completed_job_retention,
            failed_retention: config.failed_job_retention,
        },
    );

    let submissions = SubmissionService::new(
        db.clone(),
        queue.clone(),
        config.submission_storage_root.clone(),
    );
    let feedback = FeedbackService::new(db);

    let marshaller = Marshaller::new(
        GeminiFileUploader::new(config.gemini_api_key.clone()),
        UploadCache::new(chrono::Duration::hours(config.upload_cache_ttl_hours)),
    )
    .with_inline_image_limit(config.inline_image_limit_bytes);

    let client = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        Duration::from_secs(config.generation_timeout_secs),
    )
    .with_sampling(SamplingConfig {
        max_output_tokens: config.max_output_tokens,
        ..SamplingConfig::default()
    });

    let pipeline = FeedbackPipeline::new(
        submissions,
        feedback,
        marshaller,
        client,
        config.gemini_model.clone(),
    );

    let pool = WorkerPool::new(
        queue,
        Arc::new(pipeline),
        config.worker_count,
        Duration::from_millis(config.queue_poll_interval_ms),
    );
    pool.start();
    log::info!(
        "worker pool started with {} workers (model {})",
        config.worker_count,
        config.gemini_model
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    log::info!("shutdown signal received, draining workers");
    pool.shutdown().await;
    log::info!("worker pool stopped");
}
