use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adsync_core::models::Account;
use adsync_core::orchestrator::{StageOutcome, StageReport};
use adsync_core::task::RefreshTask;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AccountResponse {
    pub client_customer: String,
    pub status: String,
    pub manager_link_id: Option<String>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            client_customer: account.client_customer.clone(),
            status: account.status.to_string(),
            manager_link_id: account.manager_link_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CustomersResponse {
    /// Human-readable status line of the Accounts stage.
    pub status: String,
    pub date: NaiveDate,
    pub accounts: Vec<AccountResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StageResponse {
    pub stage: String,
    /// `loaded`, `enqueued`, `skipped` or `failed`.
    pub outcome: &'static str,
    /// Human-readable status line.
    pub status: String,
    pub table: Option<String>,
    pub tasks: Option<usize>,
}

impl From<StageReport> for StageResponse {
    fn from(report: StageReport) -> Self {
        let status = report.to_string();
        let (outcome, table, tasks) = match report.outcome {
            StageOutcome::Loaded { table, .. } => ("loaded", Some(table), None),
            StageOutcome::Enqueued { table, tasks } => ("enqueued", Some(table), Some(tasks)),
            StageOutcome::Skipped { .. } => ("skipped", None, None),
            StageOutcome::Failed { .. } => ("failed", None, None),
        };
        Self {
            stage: report.kind.stage_label().to_string(),
            outcome,
            status,
            table,
            tasks,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub status: String,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateTaskResponse {
    pub task_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TaskResponse {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// Human-readable description of the payload.
    pub description: String,
    pub dedup_key: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub summary: Option<String>,
    pub worker_id: Option<String>,
}

impl From<RefreshTask> for TaskResponse {
    fn from(task: RefreshTask) -> Self {
        Self {
            id: task.id,
            payload: serde_json::to_value(&task.payload).unwrap_or_default(),
            description: task.payload.to_string(),
            dedup_key: task.dedup_key,
            status: task.status.to_string(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            next_retry_at: task.next_retry_at,
            error_message: task.error_message,
            summary: task.summary,
            worker_id: task.worker_id,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
