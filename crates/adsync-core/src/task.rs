use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EntityKind, partition_key};

/// Status of a refresh task in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// What a task does when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Export one entity kind for one account into the day's table.
    FetchAccount {
        kind: EntityKind,
        account_id: String,
        date: NaiveDate,
    },
    /// Run every stage in order.
    FullCycle,
}

impl TaskPayload {
    /// Key shared by tasks doing the same work. At most one task per key is
    /// active (pending or running) at a time.
    pub fn dedup_key(&self) -> String {
        match self {
            TaskPayload::FetchAccount {
                kind,
                account_id,
                date,
            } => format!("fetch:{}:{}:{}", kind, account_id, partition_key(*date)),
            TaskPayload::FullCycle => "full_cycle".to_string(),
        }
    }
}

impl fmt::Display for TaskPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPayload::FetchAccount {
                kind, account_id, ..
            } => write!(f, "{} for account {}", kind, account_id),
            TaskPayload::FullCycle => f.write_str("full refresh cycle"),
        }
    }
}

/// Retry configuration with exponential backoff.
///
/// Delay schedule: 1min, 5min, 30min, 60min (capped).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let delay = match attempt {
            0 | 1 => TimeDelta::minutes(1),
            2 => TimeDelta::minutes(5),
            3 => TimeDelta::minutes(30),
            _ => TimeDelta::minutes(60),
        };
        std::cmp::min(delay, self.max_delay)
    }
}

/// A refresh task in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTask {
    pub id: Uuid,
    pub payload: TaskPayload,
    pub dedup_key: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Status line of the last successful run.
    pub summary: Option<String>,
    pub worker_id: Option<String>,
}

impl RefreshTask {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig) -> DateTime<Utc> {
        let delay = config.delay_for_attempt(self.retry_count + 1);
        Utc::now() + delay
    }
}

/// Request to enqueue a refresh task.
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub payload: TaskPayload,
    pub max_retries: Option<u32>,
}

impl CreateTaskRequest {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            payload,
            max_retries: None,
        }
    }

    pub fn fetch_account(kind: EntityKind, account_id: impl Into<String>, date: NaiveDate) -> Self {
        Self::new(TaskPayload::FetchAccount {
            kind,
            account_id: account_id.into(),
            date,
        })
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Upper bound on a single task's run time.
    pub task_timeout: Duration,
    pub retry_config: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(30 * 60),
            retry_config: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }
}
