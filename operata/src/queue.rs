use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::Utc;
use common::Database;
use serde::{Deserialize, Serialize};

pub const SCHEDULED_TX_QUEUE: &str = "scheduled-transactions";
pub const DEFAULT_ATTEMPTS: i64 = 6;
pub const DEFAULT_BACKOFF_BASE_MS: i64 = 10_000;

const WORKER_CONCURRENCY: usize = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const LOCK_LEASE_SECS: i64 = 30;
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(10);
const REAPER_INTERVAL: Duration = Duration::from_secs(10);

/// Wire shape of a queued job: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueJob {
    ScheduledTransaction(ScheduledTransactionJob),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTransactionJob {
    pub page_id: String,
    pub wallet_id: String,
    pub to_address: String,
    pub amount: String,
    pub schedule_date: NaiveDateTime,
    pub transaction_name: String,
}

/// Failure classification returned by the processor and consumed by the
/// queue to decide requeue vs. terminal-fail.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("retryable: {0}")]
    Retryable(#[source] anyhow::Error),
    #[error("fatal: {0}")]
    Fatal(#[source] anyhow::Error),
}

#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    /// Must be idempotent: jobs are delivered at least once.
    async fn process(&self, job: &QueueJob) -> Result<(), JobError>;

    /// Called once when a job's retry budget is spent or a fatal error ends
    /// it early.
    async fn exhausted(&self, job: &QueueJob, error: &JobError);
}

pub struct EnqueueOptions {
    pub delay_ms: i64,
    pub attempts: i64,
    pub backoff_base_ms: i64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        EnqueueOptions {
            delay_ms: 0,
            attempts: DEFAULT_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        }
    }
}

/// Delay until a schedule date, clamped at zero for dates in the past.
pub fn delay_until(schedule_date: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (schedule_date - now).num_milliseconds().max(0)
}

/// Exponential backoff: base, 2·base, 4·base, ... for attempt 1, 2, 3, ...
fn backoff_delay_ms(base_ms: i64, completed_attempts: i64) -> i64 {
    base_ms.saturating_mul(1_i64 << (completed_attempts - 1).clamp(0, 32))
}

/// Durable delayed-job broker over the `queue_jobs` table. Jobs become
/// eligible no earlier than their delay; dispatch afterward is best-effort
/// based on worker availability. Delivery is at-least-once: a worker that
/// stops renewing its 30s lock lease loses the job to redelivery.
#[derive(Clone)]
pub struct DelayQueue {
    db: Database,
    queue: String,
}

impl DelayQueue {
    pub fn new(db: Database, queue: &str) -> Self {
        DelayQueue {
            db,
            queue: queue.to_string(),
        }
    }

    pub async fn enqueue(&self, job: &QueueJob, options: &EnqueueOptions) -> anyhow::Result<i64> {
        let payload = serde_json::to_string(job)?;
        let run_at = Utc::now().naive_utc() + chrono::Duration::milliseconds(options.delay_ms);
        let job_id = self
            .db
            .enqueue_job(
                &self.queue,
                &payload,
                run_at,
                options.attempts,
                options.backoff_base_ms,
            )
            .await?;
        log::info!(
            "Enqueued job {job_id} on `{}` with delay {}ms",
            self.queue,
            options.delay_ms
        );
        Ok(job_id)
    }

    /// Spawns the worker pool and the stalled-job reaper. Tasks run for the
    /// lifetime of the process.
    pub fn start_workers(&self, processor: Arc<dyn JobProcessor>) {
        for worker_index in 0..WORKER_CONCURRENCY {
            let queue = self.clone();
            let processor = processor.clone();
            let worker = format!("{}-worker-{worker_index}", self.queue);
            tokio::spawn(async move {
                loop {
                    match queue.process_one(&worker, processor.as_ref()).await {
                        Ok(true) => {}
                        Ok(false) => tokio::time::sleep(POLL_INTERVAL).await,
                        Err(e) => {
                            log::error!("Worker {worker} iteration failed: {e:#}");
                            tokio::time::sleep(POLL_INTERVAL).await;
                        }
                    }
                }
            });
        }

        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAPER_INTERVAL).await;
                match queue.db.release_stalled_jobs(Utc::now().naive_utc()).await {
                    Ok(0) => {}
                    Ok(count) => log::warn!("Redelivering {count} stalled job(s)"),
                    Err(e) => log::error!("Stalled-job sweep failed: {e:#}"),
                }
            }
        });

        log::info!(
            "Started {WORKER_CONCURRENCY} workers on queue `{}`",
            self.queue
        );
    }

    /// Claims and runs at most one due job. Returns whether a job was
    /// claimed.
    pub async fn process_one(
        &self,
        worker: &str,
        processor: &dyn JobProcessor,
    ) -> anyhow::Result<bool> {
        let now = Utc::now().naive_utc();
        let lease = now + chrono::Duration::seconds(LOCK_LEASE_SECS);
        let Some(row) = self.db.claim_due_job(&self.queue, worker, now, lease).await? else {
            return Ok(false);
        };

        let job: QueueJob = match serde_json::from_str(&row.payload) {
            Ok(job) => job,
            Err(e) => {
                // an undecodable payload can never succeed, drop it
                log::error!("Dropping job {} with invalid payload: {e}", row.id);
                self.db.delete_job(row.id).await?;
                return Ok(true);
            }
        };

        log::info!("Worker {worker} processing job {}", row.id);
        let outcome = self.run_with_lease(row.id, &job, processor).await;

        match outcome {
            Ok(()) => {
                log::info!("Job {} completed successfully", row.id);
                self.db.delete_job(row.id).await?;
            }
            Err(error @ JobError::Fatal(_)) => {
                log::error!("Job {} failed fatally: {error:#}", row.id);
                processor.exhausted(&job, &error).await;
                self.db.delete_job(row.id).await?;
            }
            Err(error @ JobError::Retryable(_)) => {
                let attempts = row.attempts + 1;
                if attempts >= row.max_attempts {
                    log::error!(
                        "Job {} exhausted its {} attempts: {error:#}",
                        row.id,
                        row.max_attempts
                    );
                    processor.exhausted(&job, &error).await;
                    self.db.delete_job(row.id).await?;
                } else {
                    let delay_ms = backoff_delay_ms(row.backoff_base_ms, attempts);
                    let run_at =
                        Utc::now().naive_utc() + chrono::Duration::milliseconds(delay_ms);
                    log::warn!(
                        "Job {} failed (attempt {attempts}/{}), retrying in {delay_ms}ms: {error:#}",
                        row.id,
                        row.max_attempts
                    );
                    self.db
                        .reschedule_job(row.id, run_at, attempts, &format!("{error:#}"))
                        .await?;
                }
            }
        }
        Ok(true)
    }

    /// Runs the processor while renewing the job's lock lease so a long
    /// execution is not mistaken for a stall.
    async fn run_with_lease(
        &self,
        job_id: i64,
        job: &QueueJob,
        processor: &dyn JobProcessor,
    ) -> Result<(), JobError> {
        let processing = processor.process(job);
        tokio::pin!(processing);
        let mut renew = tokio::time::interval(LEASE_RENEW_INTERVAL);
        renew.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                outcome = &mut processing => return outcome,
                _ = renew.tick() => {
                    let lease = Utc::now().naive_utc() + chrono::Duration::seconds(LOCK_LEASE_SECS);
                    if let Err(e) = self.db.renew_job_lease(job_id, lease).await {
                        log::warn!("Failed to renew lease for job {job_id}: {e:#}");
                    }
                }
            }
        }
    }
}
