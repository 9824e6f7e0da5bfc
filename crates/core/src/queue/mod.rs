//! Durable job queue with at-least-once delivery.

mod sqlite;
mod types;

pub use sqlite::SqliteJobQueue;
pub use types::{Job, JobQueue, JobStatus, QueueError, QueueStats, RetryPolicy, PROCESS_REPORT};
