//! Worker pool driving the job queue.
//!
//! - Workers: N loops, each pulling one job at a time
//! - Reaper: every worker tick fails reports whose job died on its final attempt
//! - Purge: one loop running the lifecycle sweep on a timer

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::lifecycle::LifecycleManager;
use crate::queue::{JobQueue, QueueError, PROCESS_REPORT};

use super::pipeline::ReportPipeline;
use super::types::{Attempt, ProcessOutcome, WorkerError, WorkerStatus};

/// How long `stop` waits for in-flight jobs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl PoolStats {
    fn record(&self, outcome: &ProcessOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ProcessOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Retry { .. } => {
                self.retried.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Runs report jobs from the queue and the periodic purge sweep.
pub struct WorkerPool {
    pipeline: ReportPipeline,
    queue: Arc<dyn JobQueue>,
    lifecycle: Option<Arc<LifecycleManager>>,
    config: WorkerConfig,
    purge_interval: Duration,

    running: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(pipeline: ReportPipeline, queue: Arc<dyn JobQueue>, config: WorkerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pipeline,
            queue,
            lifecycle: None,
            config,
            purge_interval: Duration::from_secs(3600),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PoolStats::default()),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Also run the purge sweep every `interval`.
    pub fn with_lifecycle(mut self, lifecycle: Arc<LifecycleManager>, interval: Duration) -> Self {
        self.lifecycle = Some(lifecycle);
        self.purge_interval = interval;
        self
    }

    /// Start the pool (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(workers = self.config.workers, "Starting worker pool");

        let mut handles = self.handles.lock().await;
        for n in 0..self.config.workers {
            handles.push(self.spawn_worker(n));
        }
        if let Some(ref lifecycle) = self.lifecycle {
            handles.push(self.spawn_purge_loop(Arc::clone(lifecycle)));
        }

        info!("Worker pool started");
    }

    /// Stop the pool, letting in-flight jobs finish for a short grace period.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let count = handles.len();
        if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(handles))
            .await
            .is_err()
        {
            // Their jobs are redelivered once the locks expire.
            warn!(tasks = count, "Workers did not stop within {:?}", SHUTDOWN_GRACE);
        }

        info!("Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> WorkerStatus {
        let queue = self.queue.stats().unwrap_or_else(|e| {
            warn!("Failed to read queue stats: {}", e);
            Default::default()
        });
        WorkerStatus {
            running: self.is_running(),
            workers: self.config.workers,
            active_jobs: self.stats.active.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            retried: self.stats.retried.load(Ordering::Relaxed),
            queue,
        }
    }

    fn spawn_worker(&self, n: usize) -> JoinHandle<()> {
        let worker_id = format!("worker-{}-{}", n, &uuid::Uuid::new_v4().to_string()[..8]);
        let pipeline = self.pipeline.for_worker(worker_id.clone());
        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(worker = %worker_id, "Worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(worker = %worker_id, "Worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::reap(&pipeline, &queue).await {
                            warn!(worker = %worker_id, "Reaper error: {}", e);
                        }
                        // Drain ready jobs before sleeping again.
                        while running.load(Ordering::Relaxed) {
                            match Self::run_one(&pipeline, &queue, &stats, &config).await {
                                Ok(true) => continue,
                                Ok(false) => break,
                                Err(e) => {
                                    warn!(worker = %worker_id, "Worker error: {}", e);
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            info!(worker = %worker_id, "Worker stopped");
        })
    }

    fn spawn_purge_loop(&self, lifecycle: Arc<LifecycleManager>) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let interval = self.purge_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Purge loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Purge loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let summary = lifecycle.purge_sweep(Utc::now()).await;
                        debug!(?summary, "Purge sweep complete");
                    }
                }
            }
            info!("Purge loop stopped");
        })
    }

    /// Fail the reports of jobs that expired on their final attempt.
    async fn reap(pipeline: &ReportPipeline, queue: &Arc<dyn JobQueue>) -> Result<(), WorkerError> {
        for job in queue.reap_expired(Utc::now())? {
            warn!(job_id = job.id, report_id = %job.report_id, "Job expired on its final attempt");
            pipeline
                .fail_abandoned(&job.report_id, "processing timed out")
                .await;
        }
        Ok(())
    }

    /// Run one job if one is ready. Returns whether a job was handled.
    async fn run_one(
        pipeline: &ReportPipeline,
        queue: &Arc<dyn JobQueue>,
        stats: &PoolStats,
        config: &WorkerConfig,
    ) -> Result<bool, WorkerError> {
        let Some(job) = queue.dequeue(pipeline.worker_id(), Utc::now())? else {
            return Ok(false);
        };

        if job.handler != PROCESS_REPORT {
            error!(job_id = job.id, handler = %job.handler, "Unknown job handler, discarding");
            Self::settle(queue.ack(job.id, pipeline.worker_id()), job.id, pipeline.worker_id())?;
            return Ok(true);
        }

        let attempt = Attempt::new(job.attempts, job.max_attempts);
        let timeout = Duration::from_secs(job.timeout_secs);

        stats.active.fetch_add(1, Ordering::Relaxed);
        let outcome =
            match tokio::time::timeout(timeout, pipeline.process(&job.report_id, attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        job_id = job.id,
                        report_id = %job.report_id,
                        "Job exceeded its {}s timeout",
                        job.timeout_secs
                    );
                    pipeline
                        .abandon(
                            &job.report_id,
                            attempt,
                            &format!("processing timed out after {}s", job.timeout_secs),
                        )
                        .await
                }
            };
        stats.active.fetch_sub(1, Ordering::Relaxed);
        stats.record(&outcome);

        debug!(job_id = job.id, report_id = %job.report_id, outcome = outcome.label(), "Job finished");

        let worker_id = pipeline.worker_id();
        let settled = match outcome {
            ProcessOutcome::Retry { ref error } => queue
                .retry(job.id, worker_id, error, config.retry_backoff_secs, Utc::now())
                .map(|_| ()),
            _ => queue.ack(job.id, worker_id),
        };
        Self::settle(settled, job.id, worker_id)?;

        Ok(true)
    }

    /// A job whose lock moved to another worker is left to that worker.
    fn settle(
        result: Result<(), QueueError>,
        job_id: i64,
        worker_id: &str,
    ) -> Result<(), WorkerError> {
        match result {
            Ok(()) => Ok(()),
            Err(QueueError::NotOwned { .. }) => {
                warn!(
                    job_id,
                    worker = %worker_id,
                    "Lock lost before the job was settled, leaving it to its new owner"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run queued jobs on the calling task until none is ready.
    /// Returns the number handled.
    pub async fn drain(&self) -> Result<usize, WorkerError> {
        let mut handled = 0;
        while Self::run_one(&self.pipeline, &self.queue, &self.stats, &self.config).await? {
            handled += 1;
        }
        Ok(handled)
    }
}
