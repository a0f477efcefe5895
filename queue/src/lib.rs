//! Durable at-least-once job queue and worker pool for submission
//! processing.
//!
//! Jobs live in the shared database, which is the single source of truth
//! for job state: workers coordinate only through atomic claims on the
//! jobs table, never through shared memory.

pub mod error;
pub mod queue;
pub mod worker;

pub use error::QueueError;
pub use queue::{FailOutcome, JobQueue, QueueConfig, QueueCounts};
pub use worker::{JobHandler, ProcessError, WorkerPool};
