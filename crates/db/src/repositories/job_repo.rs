//! Repository for the `jobs` table.
//!
//! Every transition is a conditional `UPDATE ... WHERE status = <expected>`
//! so concurrent callers (dispatchers, executors, cancel requests) can
//! never move a job along an edge the state machine does not have. A
//! method that loses the race affects zero rows and reports it.

use atelier_core::job::{JobStatus, TERMINAL_STATUSES};
use atelier_core::request::{JobListQuery, NewJob};
use atelier_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::JobRow;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_scope, kind, provider, model, \
    prompt_original, prompt_alternatives, input_images, mask, output_spec, variations, \
    status, progress, result, error_code, error_message, \
    created_at, started_at, completed_at";

/// Provides the conditional state transitions for generation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `queued` state. Returns immediately with the row.
    pub async fn insert(pool: &PgPool, input: &NewJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (owner_scope, kind, provider, model, prompt_original, prompt_alternatives, \
                  input_images, mask, output_spec, variations, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(input.owner_scope)
            .bind(input.kind.as_str())
            .bind(&input.provider)
            .bind(&input.model)
            .bind(&input.prompt_original)
            .bind(&input.prompt_alternatives)
            .bind(Json(&input.input_images))
            .bind(input.mask.as_ref().map(Json))
            .bind(Json(&input.output_spec))
            .bind(input.variations)
            .bind(JobStatus::Queued.as_str())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim up to `limit` queued jobs, oldest first.
    ///
    /// The inner `SELECT ... FOR UPDATE SKIP LOCKED` keeps concurrent
    /// dispatchers off each other's candidate rows, and the outer
    /// `status = 'queued'` guard re-checks the row at update time, so a job
    /// canceled between selection and update is not claimed.
    pub async fn claim_batch(pool: &PgPool, limit: i64) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $1, started_at = NOW(), updated_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM jobs \
                 WHERE status = $2 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             AND status = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Processing.as_str())
            .bind(JobStatus::Queued.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Raise the progress percentage of a processing job.
    ///
    /// Lower values are ignored so progress never goes backwards. Returns
    /// `false` when nothing was updated.
    pub async fn update_progress(
        pool: &PgPool,
        id: DbId,
        percent: i16,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3 AND (progress IS NULL OR progress < $2)",
        )
        .bind(id)
        .bind(percent.clamp(0, 100))
        .bind(JobStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a processing job as done with its asset ids.
    ///
    /// Returns `false` if the job is no longer processing (e.g. it was
    /// canceled while the executor was running); the cancellation wins.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        asset_ids: &[DbId],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = $2, result = $3, progress = NULL, \
                 completed_at = GREATEST(NOW(), started_at), updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(JobStatus::Done.as_str())
        .bind(asset_ids)
        .bind(JobStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a processing job as failed with a typed error.
    ///
    /// No automatic retry is performed. A fresh job must be submitted.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        code: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = $2, error_code = $3, error_message = $4, progress = NULL, \
                 completed_at = GREATEST(NOW(), started_at), updated_at = NOW() \
             WHERE id = $1 AND status = $5",
        )
        .bind(id)
        .bind(JobStatus::Failed.as_str())
        .bind(code)
        .bind(message)
        .bind(JobStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every processing job untouched for at least `older_than_secs`.
    ///
    /// `updated_at` moves on claim and on each progress write, so a job
    /// whose executor died (or lost its terminal write) stops advancing it.
    /// The `status` guard keeps a concurrent completion or cancel intact.
    pub async fn fail_stale(
        pool: &PgPool,
        older_than_secs: f64,
        code: &str,
        message: &str,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $1, error_code = $2, error_message = $3, progress = NULL, \
                 completed_at = GREATEST(NOW(), started_at), updated_at = NOW() \
             WHERE status = $4 AND updated_at <= NOW() - make_interval(secs => $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Failed.as_str())
            .bind(code)
            .bind(message)
            .bind(JobStatus::Processing.as_str())
            .bind(older_than_secs)
            .fetch_all(pool)
            .await
    }

    /// Cancel a job that is queued or processing.
    ///
    /// Returns the updated row, or `None` if the job does not exist or is
    /// already terminal.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, progress = NULL, \
                 completed_at = GREATEST(NOW(), started_at), updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ($3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(JobStatus::Canceled.as_str())
            .bind(TERMINAL_STATUSES[0].as_str())
            .bind(TERMINAL_STATUSES[1].as_str())
            .bind(TERMINAL_STATUSES[2].as_str())
            .fetch_optional(pool)
            .await
    }

    /// List a scope's jobs with optional status filter and pagination.
    pub async fn list_by_scope(
        pool: &PgPool,
        owner_scope: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE owner_scope = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(owner_scope)
            .bind(params.status.map(|s| s.as_str()))
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
    }
}
