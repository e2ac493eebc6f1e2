use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use adsync_core::error::AppError;
use adsync_core::task::{CreateTaskRequest, RefreshTask, TaskPayload, TaskStatus};
use adsync_core::task_queue::TaskQueue;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// PostgreSQL-backed refresh task queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct RefreshTaskRepository {
    pool: Pool<Postgres>,
}

impl RefreshTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_active(&self, dedup_key: &str) -> Result<Option<RefreshTask>, AppError> {
        let row = sqlx::query_as::<_, RefreshTaskRow>(
            r#"
            SELECT * FROM refresh_tasks
            WHERE dedup_key = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(dedup_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(TryInto::try_into).transpose()
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct RefreshTaskRow {
    id: Uuid,
    payload: serde_json::Value,
    dedup_key: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    summary: Option<String>,
    worker_id: Option<String>,
}

impl TryFrom<RefreshTaskRow> for RefreshTask {
    type Error = AppError;

    fn try_from(row: RefreshTaskRow) -> Result<Self, Self::Error> {
        let payload: TaskPayload = serde_json::from_value(row.payload)?;
        Ok(RefreshTask {
            id: row.id,
            payload,
            dedup_key: row.dedup_key,
            status: row.status.parse().unwrap_or(TaskStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            summary: row.summary,
            worker_id: row.worker_id,
        })
    }
}

impl TaskQueue for RefreshTaskRepository {
    async fn create_task(&self, request: CreateTaskRequest) -> Result<RefreshTask, AppError> {
        let dedup_key = request.payload.dedup_key();
        let payload = serde_json::to_value(&request.payload)?;
        let max_retries = request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES) as i32;

        // A concurrent insert can win the unique index and then finish before
        // we read it back; one more attempt covers that window.
        for _ in 0..2 {
            let inserted = sqlx::query_as::<_, RefreshTaskRow>(
                r#"
                INSERT INTO refresh_tasks (payload, dedup_key, max_retries)
                VALUES ($1, $2, $3)
                ON CONFLICT (dedup_key) WHERE status IN ('pending', 'running') DO NOTHING
                RETURNING *
                "#,
            )
            .bind(&payload)
            .bind(&dedup_key)
            .bind(max_retries)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

            if let Some(row) = inserted {
                return row.try_into();
            }
            if let Some(existing) = self.find_active(&dedup_key).await? {
                tracing::debug!(%dedup_key, task_id = %existing.id, "Task already active");
                return Ok(existing);
            }
        }

        Err(AppError::DatabaseError(format!(
            "could not enqueue task with key '{dedup_key}'"
        )))
    }

    async fn claim_task(&self, worker_id: &str) -> Result<Option<RefreshTask>, AppError> {
        let row = sqlx::query_as::<_, RefreshTaskRow>(
            r#"
            UPDATE refresh_tasks
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM refresh_tasks
                WHERE status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY next_retry_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn complete_task(&self, task_id: Uuid, summary: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE refresh_tasks
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                summary = $2, error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(summary)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn fail_task(
        &self,
        task_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        // A retry time puts the task back to pending; otherwise it is final.
        sqlx::query(
            r#"
            UPDATE refresh_tasks
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN $3::timestamptz IS NOT NULL THEN retry_count + 1 ELSE retry_count END,
                next_retry_at = $3,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn cancel_task(&self, task_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE refresh_tasks
            SET status = 'cancelled', updated_at = NOW(), worker_id = NULL
            WHERE id = $1 AND status NOT IN ('completed', 'cancelled')
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<RefreshTask>, AppError> {
        let row =
            sqlx::query_as::<_, RefreshTaskRow>(r#"SELECT * FROM refresh_tasks WHERE id = $1"#)
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<RefreshTask>, AppError> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, RefreshTaskRow>(
                r#"
                SELECT * FROM refresh_tasks
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, RefreshTaskRow>(
                r#"
                SELECT * FROM refresh_tasks
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(db_error)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn release_worker_tasks(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tasks
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM refresh_tasks WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(count)
    }
}
