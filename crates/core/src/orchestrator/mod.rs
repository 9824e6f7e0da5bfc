//! Report processing: the pipeline and the worker pool that feeds it.
//!
//! - **Pipeline**: one job at a time per worker, stages run sequentially
//! - **Workers**: N loops pulling from the job queue, with per-job timeout
//! - **Purge**: periodic lifecycle sweep

mod pipeline;
mod runner;
mod sanitize;
mod types;

pub use pipeline::{output_key, source_key, ReportPipeline};
pub use runner::WorkerPool;
pub use sanitize::{sanitize_error, MAX_ERROR_CHARS};
pub use types::{Attempt, PipelineError, ProcessOutcome, WorkerError, WorkerStatus};
