//! Sync-job queue and background worker.
//!
//! `POST /v1/erp/sync` and the post-connect flow enqueue a row in
//! `sync_jobs`; this worker claims pending rows via `FOR UPDATE SKIP LOCKED`,
//! hands each one to a [`SyncRunner`], and drives the owning user's
//! `sync_status` from `SYNCING` to `COMPLETED` or `FAILED`. Failures retry
//! with exponential backoff until a max attempt threshold.
//!
//! The runner is the seam to the actual synchronization engine: it receives
//! the user's ERP access token and returns a summary. The default
//! [`LogSyncRunner`] only logs, which keeps the alert/metric computation
//! external to this service.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::api::email::backoff_delay;
use crate::session::SyncStatus;

/// A claimed sync job.
#[derive(Clone, Debug)]
pub struct SyncJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub attempts: u32,
}

/// What a completed run reports back; stored on the job row for visibility.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncSummary {
    pub products: u64,
    pub orders: u64,
}

/// Synchronization engine abstraction used by the worker.
pub trait SyncRunner: Send + Sync {
    /// Perform a full sync for one user or return an error to schedule a retry.
    ///
    /// # Errors
    /// Returns an error when the upstream ERP cannot be synced.
    fn run(&self, user_id: Uuid, access_token: &str) -> Result<SyncSummary>;
}

/// Local dev runner that logs instead of talking to the ERP.
#[derive(Clone, Debug)]
pub struct LogSyncRunner;

impl SyncRunner for LogSyncRunner {
    fn run(&self, user_id: Uuid, _access_token: &str) -> Result<SyncSummary> {
        info!(user_id = %user_id, "sync runner stub");
        Ok(SyncSummary::default())
    }
}

/// Outcome of a dispatch request; enqueuing is idempotent per user.
#[derive(Debug, Eq, PartialEq)]
pub enum EnqueueOutcome {
    Queued,
    AlreadyPending,
}

#[derive(Clone, Copy, Debug)]
pub struct SyncWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl SyncWorkerConfig {
    /// Default worker config: 5s poll interval, 2 jobs per batch, 3 max
    /// attempts, and 30s->10m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 2,
            max_attempts: 3,
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(600),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        Self {
            poll_interval,
            batch_size,
            max_attempts: self.max_attempts.max(1),
            ..self
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Enqueue a sync job for a user unless one is already pending or running,
/// and flip the user's sync status to `SYNCING`.
///
/// # Errors
/// Returns an error if the queue insert fails.
pub async fn enqueue_sync_job(pool: &PgPool, user_id: Uuid) -> Result<EnqueueOutcome> {
    let mut tx = pool.begin().await.context("begin sync enqueue")?;

    let query = r"
        SELECT 1
        FROM sync_jobs
        WHERE user_id = $1
          AND status IN ('pending', 'running')
        LIMIT 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let pending = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to check pending sync jobs")?;

    if pending.is_some() {
        tx.commit().await.context("commit sync enqueue noop")?;
        return Ok(EnqueueOutcome::AlreadyPending);
    }

    let query = "INSERT INTO sync_jobs (user_id) VALUES ($1)";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert sync job")?;

    update_user_sync_status(&mut tx, user_id, SyncStatus::Syncing).await?;

    tx.commit().await.context("commit sync enqueue")?;
    Ok(EnqueueOutcome::Queued)
}

/// Spawn a background task that polls and processes the sync-job queue.
pub fn spawn_sync_worker(
    pool: PgPool,
    runner: Arc<dyn SyncRunner>,
    config: SyncWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            let batch_result = process_sync_batch(&pool, runner.as_ref(), &config).await;
            if let Err(err) = batch_result {
                error!("sync job batch failed: {err}");
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_sync_batch(
    pool: &PgPool,
    runner: &dyn SyncRunner,
    config: &SyncWorkerConfig,
) -> Result<usize> {
    let mut tx = pool.begin().await.context("begin sync batch")?;

    // Claim a locked batch so multiple workers never double-run a job.
    let query = r"
        SELECT id, user_id, attempts
        FROM sync_jobs
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to claim sync job batch")?;

    if rows.is_empty() {
        tx.commit().await.context("commit empty sync batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let attempts: i32 = row.get("attempts");
        let job = SyncJob {
            id: row.get("id"),
            user_id: row.get("user_id"),
            attempts: u32::try_from(attempts).unwrap_or(0),
        };

        let run_result = match lookup_access_token(&mut tx, job.user_id).await? {
            Some(access_token) => runner.run(job.user_id, &access_token),
            // Disconnected mid-flight; no point retrying without a token.
            None => {
                fail_job(&mut tx, &job, "ERP connection missing").await?;
                continue;
            }
        };

        match run_result {
            Ok(summary) => complete_job(&mut tx, &job, summary).await?,
            Err(err) => retry_or_fail_job(&mut tx, &job, &err, config).await?,
        }
    }

    tx.commit().await.context("commit sync batch")?;
    Ok(row_count)
}

async fn lookup_access_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<Option<String>> {
    let query = r"
        SELECT access_token
        FROM erp_connections
        WHERE user_id = $1
        LIMIT 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup ERP access token")?;
    Ok(row.map(|row| row.get("access_token")))
}

async fn complete_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job: &SyncJob,
    summary: SyncSummary,
) -> Result<()> {
    let query = r"
        UPDATE sync_jobs
        SET status = 'completed',
            attempts = attempts + 1,
            last_error = NULL,
            finished_at = NOW(),
            products_synced = $2,
            orders_synced = $3
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(job.id)
        .bind(i64::try_from(summary.products).unwrap_or(i64::MAX))
        .bind(i64::try_from(summary.orders).unwrap_or(i64::MAX))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to complete sync job")?;

    let query = r"
        UPDATE users
        SET sync_status = $2,
            last_synced_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(job.user_id)
        .bind(SyncStatus::Completed.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update user sync status")?;
    Ok(())
}

async fn retry_or_fail_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job: &SyncJob,
    err: &anyhow::Error,
    config: &SyncWorkerConfig,
) -> Result<()> {
    let next_attempt = job.attempts.saturating_add(1);
    if next_attempt >= config.max_attempts() {
        return fail_job(tx, job, &err.to_string()).await;
    }

    let delay = backoff_delay(next_attempt, config.backoff_base(), config.backoff_max());
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE sync_jobs
        SET status = 'pending',
            attempts = attempts + 1,
            last_error = $2,
            next_attempt_at = NOW() + ($3 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(job.id)
        .bind(err.to_string())
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to schedule sync retry")?;
    Ok(())
}

async fn fail_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job: &SyncJob,
    reason: &str,
) -> Result<()> {
    let query = r"
        UPDATE sync_jobs
        SET status = 'failed',
            attempts = attempts + 1,
            last_error = $2,
            finished_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(job.id)
        .bind(reason)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark sync job failed")?;

    let query = r"
        UPDATE users
        SET sync_status = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(job.user_id)
        .bind(SyncStatus::Failed.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update user sync status")?;
    Ok(())
}

async fn update_user_sync_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    status: SyncStatus,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET sync_status = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update user sync status")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_normalize_clamps_zeroes() {
        let config = SyncWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn log_runner_reports_empty_summary() {
        let summary = LogSyncRunner
            .run(Uuid::nil(), "token")
            .expect("log runner never fails");
        assert_eq!(summary.products, 0);
        assert_eq!(summary.orders, 0);
    }

    #[test]
    fn enqueue_outcome_equality() {
        assert_eq!(EnqueueOutcome::Queued, EnqueueOutcome::Queued);
        assert_ne!(EnqueueOutcome::Queued, EnqueueOutcome::AlreadyPending);
    }
}
