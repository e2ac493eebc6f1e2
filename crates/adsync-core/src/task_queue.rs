use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::task::{CreateTaskRequest, RefreshTask, TaskStatus};

/// Persistent, at-least-once queue of refresh tasks.
///
/// Implementations must support atomic claiming via `SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent to prevent multiple workers from claiming the same task.
pub trait TaskQueue: Send + Sync + Clone {
    /// Enqueue a task. If a pending or running task with the same dedup key
    /// exists, that task is returned instead.
    fn create_task(
        &self,
        request: CreateTaskRequest,
    ) -> impl Future<Output = Result<RefreshTask, AppError>> + Send;

    /// Atomically claim the next pending task whose retry time has passed.
    ///
    /// Returns `None` if no tasks are available.
    fn claim_task(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<RefreshTask>, AppError>> + Send;

    fn complete_task(
        &self,
        task_id: Uuid,
        summary: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark a task as failed. If `next_retry_at` is provided, the task is
    /// reset to `pending` for redelivery; otherwise it is marked as permanently `failed`.
    fn fail_task(
        &self,
        task_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn cancel_task(&self, task_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_task(
        &self,
        task_id: Uuid,
    ) -> impl Future<Output = Result<Option<RefreshTask>, AppError>> + Send;

    fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RefreshTask>, AppError>> + Send;

    /// Release all tasks held by a specific worker (for graceful shutdown).
    fn release_worker_tasks(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: TaskStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
