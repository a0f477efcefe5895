//! Worker pool pulling jobs off the queue and driving the processing
//! pipeline, with an explicit start/shutdown lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::{FailOutcome, JobQueue};

/// Error surfaced by a handler for one processing attempt.
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// What the pool runs for each claimed job.
///
/// Implemented by the services layer; the queue knows nothing about
/// submissions beyond their id.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// One processing attempt. Any error fails the job and lets the
    /// queue's retry policy govern what happens next.
    async fn process(&self, submission_id: i64) -> Result<(), ProcessError>;

    /// Called exactly once, after the job has been dead-lettered. This is
    /// the only place a submission gets marked failed by the pipeline.
    async fn on_exhausted(&self, submission_id: i64);
}

/// A bounded pool of workers polling the shared queue.
///
/// Workers hold no shared mutable state; coordination happens entirely
/// through the queue's atomic claims.
pub struct WorkerPool<H: JobHandler> {
    queue: JobQueue,
    handler: Arc<H>,
    worker_count: usize,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<H: JobHandler> WorkerPool<H> {
    pub fn new(
        queue: JobQueue,
        handler: Arc<H>,
        worker_count: usize,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            queue,
            handler,
            worker_count,
            poll_interval,
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the workers. Idempotent only in the sense that calling it
    /// twice spawns a second set; callers own the lifecycle.
    pub fn start(&self) {
        let mut handles = self.handles.lock().expect("worker handle list poisoned");
        for worker_id in 0..self.worker_count {
            let queue = self.queue.clone();
            let handler = Arc::clone(&self.handler);
            let poll_interval = self.poll_interval;
            let mut shutdown = self.shutdown_rx.clone();

            handles.push(tokio::spawn(async move {
                tracing::debug!(worker_id, "worker started");
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    match run_one(&queue, handler.as_ref()).await {
                        RanJob::Yes => {}
                        RanJob::No => {
                            // Idle: wait for the next poll tick or shutdown.
                            tokio::select! {
                                _ = tokio::time::sleep(poll_interval) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                    }
                }
                tracing::debug!(worker_id, "worker stopped");
            }));
        }
    }

    /// Signals all workers to stop and waits for them to drain.
    ///
    /// In-flight jobs finish their current attempt; nothing new is claimed.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let handles = {
            let mut guard = self.handles.lock().expect("worker handle list poisoned");
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

enum RanJob {
    Yes,
    No,
}

async fn run_one<H: JobHandler>(queue: &JobQueue, handler: &H) -> RanJob {
    let job = match queue.claim_next().await {
        Ok(Some(job)) => job,
        Ok(None) => return RanJob::No,
        Err(err) => {
            tracing::error!("failed to claim job: {err}");
            return RanJob::No;
        }
    };

    match handler.process(job.submission_id).await {
        Ok(()) => {
            if let Err(err) = queue.complete(job.id).await {
                tracing::error!(job_id = job.id, "failed to mark job completed: {err}");
            }
        }
        Err(process_err) => {
            match queue.fail(job.id, &process_err.to_string()).await {
                Ok(FailOutcome::DeadLettered) => {
                    handler.on_exhausted(job.submission_id).await;
                }
                Ok(FailOutcome::Retrying { .. }) => {}
                Err(err) => {
                    tracing::error!(job_id = job.id, "failed to record job failure: {err}");
                }
            }
        }
    }
    RanJob::Yes
}
