//! Test utilities: in-memory implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::entity::query_for;
use crate::error::AppError;
use crate::models::EntityKind;
use crate::schema::{FieldKind, FieldSpec};
use crate::task::{CreateTaskRequest, RefreshTask, TaskPayload, TaskStatus};
use crate::task_queue::TaskQueue;
use crate::traits::{AdsApi, ObjectStore, RowStream, Warehouse};
use crate::worker::{TaskHandler, WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockAdsApi
// ---------------------------------------------------------------------------

/// Search call recorded by [`MockAdsApi`]: (customer_id, query).
pub type SearchCall = (String, String);

/// Ads API serving canned rows per (customer, entity kind).
#[derive(Clone, Default)]
pub struct MockAdsApi {
    rows: Arc<Mutex<HashMap<(String, EntityKind), Vec<serde_json::Value>>>>,
    /// One-shot failure injected after the given number of rows.
    failures: Arc<Mutex<HashMap<(String, EntityKind), (usize, AppError)>>>,
    calls: Arc<Mutex<Vec<SearchCall>>>,
}

impl MockAdsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, customer_id: &str, kind: EntityKind, rows: Vec<serde_json::Value>) {
        self.rows
            .lock()
            .unwrap()
            .insert((customer_id.to_string(), kind), rows);
    }

    /// The next search for this customer and kind yields `after` rows, then
    /// `error`.
    pub fn fail_after(&self, customer_id: &str, kind: EntityKind, after: usize, error: AppError) {
        self.failures
            .lock()
            .unwrap()
            .insert((customer_id.to_string(), kind), (after, error));
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl AdsApi for MockAdsApi {
    fn search(&self, customer_id: &str, query: &str) -> RowStream {
        self.calls
            .lock()
            .unwrap()
            .push((customer_id.to_string(), query.to_string()));

        let Some(kind) = EntityKind::ALL.into_iter().find(|k| query_for(*k) == query) else {
            let error = AppError::ApiError {
                message: format!("unrecognized query: {query}"),
                status_code: 400,
                retryable: false,
            };
            return futures::stream::iter(vec![Err(error)]).boxed();
        };

        let key = (customer_id.to_string(), kind);
        let rows = self.rows.lock().unwrap().get(&key).cloned().unwrap_or_default();
        let failure = self.failures.lock().unwrap().remove(&key);

        let items: Vec<Result<serde_json::Value, AppError>> = match failure {
            None => rows.into_iter().map(Ok).collect(),
            Some((after, error)) => rows
                .into_iter()
                .take(after)
                .map(Ok)
                .chain(std::iter::once(Err(error)))
                .collect(),
        };
        futures::stream::iter(items).boxed()
    }
}

/// A `customerClientLink` search row.
pub fn account_row(client_customer: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "customerClientLink": {
            "resourceName": format!("customers/999/customerClientLinks/{}", client_customer.trim_start_matches("customers/")),
            "clientCustomer": client_customer,
            "managerLinkId": "42",
            "status": status
        }
    })
}

pub fn campaign_row(i: usize) -> serde_json::Value {
    serde_json::json!({
        "campaign": {
            "resourceName": format!("customers/1/campaigns/{i}"),
            "id": i.to_string(),
            "name": format!("Campaign #{i}"),
            "status": "ENABLED",
            "servingStatus": "SERVING",
            "campaignBudget": "customers/1/campaignBudgets/1"
        }
    })
}

pub fn ad_group_row(i: usize) -> serde_json::Value {
    serde_json::json!({
        "adGroup": {
            "resourceName": format!("customers/1/adGroups/{i}"),
            "id": i.to_string(),
            "name": format!("Ad group #{i}"),
            "status": "ENABLED",
            "type": "SEARCH_STANDARD",
            "urlCustomParameters": [{"key": "src", "value": "ads"}],
            "campaign": "customers/1/campaigns/1",
            "cpcBidMicros": "1000000"
        }
    })
}

pub fn ad_group_ad_row(i: usize) -> serde_json::Value {
    serde_json::json!({
        "adGroupAd": {
            "resourceName": format!("customers/1/adGroupAds/1~{i}"),
            "status": "ENABLED",
            "adGroup": "customers/1/adGroups/1",
            "ad": {"resourceName": format!("customers/1/ads/{i}"), "id": i.to_string()},
            "policySummary": {"approvalStatus": "APPROVED", "reviewStatus": "REVIEWED"}
        }
    })
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StoredObject {
    content_type: String,
    content: Vec<u8>,
}

/// Object store keeping blobs in memory, keyed by `gs://` URI.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<Mutex<BTreeSet<String>>>,
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    write_error: Arc<Mutex<Option<AppError>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `write_blob` call fail with `error`.
    pub fn fail_next_write(&self, error: AppError) {
        *self.write_error.lock().unwrap() = Some(error);
    }

    pub fn buckets(&self) -> Vec<String> {
        self.buckets.lock().unwrap().iter().cloned().collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, uri: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(uri)
            .map(|o| String::from_utf8_lossy(&o.content).into_owned())
    }

    pub fn content_type(&self, uri: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(uri)
            .map(|o| o.content_type.clone())
    }

    /// Number of NDJSON records in a blob (0 if absent).
    pub fn line_count(&self, uri: &str) -> usize {
        self.object(uri).map(|c| c.lines().count()).unwrap_or(0)
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), AppError> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn write_blob(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<(), AppError> {
        if let Some(e) = self.write_error.lock().unwrap().take() {
            return Err(e);
        }
        self.objects.lock().unwrap().insert(
            format!("gs://{bucket}/{path}"),
            StoredObject {
                content_type: content_type.to_string(),
                content,
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryWarehouse
// ---------------------------------------------------------------------------

/// Recorded load: (dataset.table, uri).
pub type LoadRecord = (String, String);

/// Warehouse that appends the line count of loaded blobs to per-table
/// row counters. Blobs are read from the shared [`MemoryObjectStore`].
#[derive(Clone)]
pub struct MemoryWarehouse {
    store: MemoryObjectStore,
    tables: Arc<Mutex<HashMap<String, u64>>>,
    schemas: Arc<Mutex<HashMap<String, Vec<FieldSpec>>>>,
    delete_errors: Arc<Mutex<HashMap<String, AppError>>>,
    pub loads: Arc<Mutex<Vec<LoadRecord>>>,
}

impl MemoryWarehouse {
    pub fn new(store: MemoryObjectStore) -> Self {
        Self {
            store,
            tables: Arc::new(Mutex::new(HashMap::new())),
            schemas: Arc::new(Mutex::new(HashMap::new())),
            delete_errors: Arc::new(Mutex::new(HashMap::new())),
            loads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn key(dataset: &str, table: &str) -> String {
        format!("{dataset}.{table}")
    }

    pub fn seed_table(&self, dataset: &str, table: &str, rows: u64) {
        self.tables
            .lock()
            .unwrap()
            .insert(Self::key(dataset, table), rows);
    }

    /// Row count of a table (0 if absent).
    pub fn row_count(&self, dataset: &str, table: &str) -> u64 {
        self.tables
            .lock()
            .unwrap()
            .get(&Self::key(dataset, table))
            .copied()
            .unwrap_or(0)
    }

    pub fn schema(&self, dataset: &str, table: &str) -> Option<Vec<FieldSpec>> {
        self.schemas
            .lock()
            .unwrap()
            .get(&Self::key(dataset, table))
            .cloned()
    }

    /// Make the next delete of `table` (any dataset) fail with `error`.
    pub fn fail_next_delete(&self, table: &str, error: AppError) {
        self.delete_errors
            .lock()
            .unwrap()
            .insert(table.to_string(), error);
    }
}

impl Warehouse for MemoryWarehouse {
    async fn delete_table(&self, dataset: &str, table: &str) -> Result<bool, AppError> {
        tokio::task::yield_now().await;
        if let Some(e) = self.delete_errors.lock().unwrap().remove(table) {
            return Err(e);
        }
        let key = Self::key(dataset, table);
        self.schemas.lock().unwrap().remove(&key);
        Ok(self.tables.lock().unwrap().remove(&key).is_some())
    }

    async fn load_from_uri(
        &self,
        dataset: &str,
        table: &str,
        schema: &[FieldSpec],
        uri: &str,
    ) -> Result<u64, AppError> {
        tokio::task::yield_now().await;
        let content = self
            .store
            .object(uri)
            .ok_or_else(|| AppError::LoadJobError(format!("Not found: URI {uri}")))?;

        for (line_no, line) in content.lines().enumerate() {
            let record: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                AppError::LoadJobError(format!("{uri}: line {}: {e}", line_no + 1))
            })?;
            check_record_shape(schema, &record)
                .map_err(|e| AppError::LoadJobError(format!("{uri}: line {}: {e}", line_no + 1)))?;
        }

        let key = Self::key(dataset, table);
        self.loads.lock().unwrap().push((key.clone(), uri.to_string()));
        self.schemas
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| schema.to_vec());

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(key).or_insert(0);
        *rows += content.lines().count() as u64;
        Ok(*rows)
    }
}

/// Check one NDJSON record against a table schema the way a load job does:
/// repeated columns must hold arrays, record columns must hold objects.
/// Absent columns are accepted.
pub fn check_record_shape(schema: &[FieldSpec], record: &serde_json::Value) -> Result<(), String> {
    let object = record
        .as_object()
        .ok_or_else(|| format!("record is not a JSON object: {record}"))?;

    for field in schema {
        let Some(value) = object.get(&field.name) else {
            continue;
        };
        let items: Vec<&serde_json::Value> = if field.repeated {
            value
                .as_array()
                .ok_or_else(|| {
                    format!("Repeated field must be imported as a JSON array: {}", field.name)
                })?
                .iter()
                .collect()
        } else {
            vec![value]
        };

        if field.kind == FieldKind::Record {
            for item in items.into_iter().filter(|v| !v.is_null()) {
                check_record_shape(&field.children, item)
                    .map_err(|e| format!("{}.{e}", field.name))?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MockTaskQueue
// ---------------------------------------------------------------------------

/// Recorded failure: (task_id, error_message, next_retry_at).
pub type FailedTaskRecord = (Uuid, String, Option<DateTime<Utc>>);

/// Recorded completion: (task_id, summary).
pub type CompletedTaskRecord = (Uuid, String);

/// Mock task queue backed by an in-memory Vec.
#[derive(Clone)]
pub struct MockTaskQueue {
    tasks: Arc<Mutex<Vec<RefreshTask>>>,
    claim_error: Arc<Mutex<Option<AppError>>>,
    pub failed_tasks: Arc<Mutex<Vec<FailedTaskRecord>>>,
    pub completed_tasks: Arc<Mutex<Vec<CompletedTaskRecord>>>,
    pub released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockTaskQueue {
    fn from_tasks(tasks: Vec<RefreshTask>, claim_error: Option<AppError>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(tasks)),
            claim_error: Arc::new(Mutex::new(claim_error)),
            failed_tasks: Arc::new(Mutex::new(Vec::new())),
            completed_tasks: Arc::new(Mutex::new(Vec::new())),
            released_workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn empty() -> Self {
        Self::from_tasks(Vec::new(), None)
    }

    /// Queue with one pending task ready to be claimed.
    pub fn with_task(task: RefreshTask) -> Self {
        Self::from_tasks(vec![task], None)
    }

    pub fn with_claim_error(error: AppError) -> Self {
        Self::from_tasks(Vec::new(), Some(error))
    }

    /// Every task ever enqueued, in creation order.
    pub fn all_tasks(&self) -> Vec<RefreshTask> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskQueue for MockTaskQueue {
    async fn create_task(&self, request: CreateTaskRequest) -> Result<RefreshTask, AppError> {
        let dedup_key = request.payload.dedup_key();
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(active) = tasks
            .iter()
            .find(|t| t.dedup_key == dedup_key && !t.status.is_terminal())
        {
            return Ok(active.clone());
        }

        let task = RefreshTask {
            id: Uuid::new_v4(),
            payload: request.payload,
            dedup_key,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(3),
            next_retry_at: None,
            error_message: None,
            summary: None,
            worker_id: None,
        };
        tasks.push(task.clone());
        Ok(task)
    }

    async fn claim_task(&self, worker_id: &str) -> Result<Option<RefreshTask>, AppError> {
        if let Some(e) = self.claim_error.lock().unwrap().take() {
            return Err(e);
        }

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(pos) = tasks.iter().position(|t| t.status == TaskStatus::Pending) {
            tasks[pos].status = TaskStatus::Running;
            tasks[pos].worker_id = Some(worker_id.to_string());
            tasks[pos].started_at = Some(Utc::now());
            Ok(Some(tasks[pos].clone()))
        } else {
            Ok(None)
        }
    }

    async fn complete_task(&self, task_id: Uuid, summary: &str) -> Result<(), AppError> {
        self.completed_tasks
            .lock()
            .unwrap()
            .push((task_id, summary.to_string()));

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = TaskStatus::Completed;
            task.summary = Some(summary.to_string());
            task.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_task(
        &self,
        task_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.failed_tasks
            .lock()
            .unwrap()
            .push((task_id, error.to_string(), next_retry_at));

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            if next_retry_at.is_some() {
                task.status = TaskStatus::Pending;
                task.retry_count += 1;
                task.next_retry_at = next_retry_at;
            } else {
                task.status = TaskStatus::Failed;
            }
            task.error_message = Some(error.to_string());
            task.worker_id = None;
        }
        Ok(())
    }

    async fn cancel_task(&self, task_id: Uuid) -> Result<(), AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = TaskStatus::Cancelled;
        }
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<RefreshTask>, AppError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.iter().find(|t| t.id == task_id).cloned())
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<RefreshTask>, AppError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .iter()
            .rev()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn release_worker_tasks(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut tasks = self.tasks.lock().unwrap();
        let mut count = 0u64;
        for task in tasks.iter_mut() {
            if task.worker_id.as_deref() == Some(worker_id) && task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
                task.worker_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<i64, AppError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.iter().filter(|t| t.status == status).count() as i64)
    }
}

// ---------------------------------------------------------------------------
// MockTaskHandler
// ---------------------------------------------------------------------------

/// Task handler returning queued results, optionally after a delay.
#[derive(Clone)]
pub struct MockTaskHandler {
    results: Arc<Mutex<Vec<Result<String, AppError>>>>,
    delay: Option<Duration>,
    pub handled: Arc<Mutex<Vec<TaskPayload>>>,
}

impl MockTaskHandler {
    pub fn new(results: Vec<Result<String, AppError>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results)),
            delay: None,
            handled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl TaskHandler for MockTaskHandler {
    async fn handle(
        &self,
        payload: &TaskPayload,
        cancel: CancellationToken,
    ) -> Result<String, AppError> {
        self.handled.lock().unwrap().push(payload.clone());

        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(AppError::Cancelled),
            }
        }

        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok("ok".to_string())
        } else {
            results.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|label| label.as_str() != "Polling")
            .cloned()
            .collect()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Polling => "Polling",
            WorkerEvent::TaskClaimed { .. } => "TaskClaimed",
            WorkerEvent::TaskStarted { .. } => "TaskStarted",
            WorkerEvent::TaskCompleted { .. } => "TaskCompleted",
            WorkerEvent::TaskFailed { .. } => "TaskFailed",
            WorkerEvent::TaskInterrupted { .. } => "TaskInterrupted",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Pipeline configuration with a small chunk size so tests span several blobs.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        project: "test-project".to_string(),
        dataset: "ads".to_string(),
        bucket: "test-bucket".to_string(),
        mcc_id: "999".to_string(),
        account_table: "accounts_[YYYYMMDD]".to_string(),
        campaign_table: "campaigns_[YYYYMMDD]".to_string(),
        ad_group_table: "ad_groups_[YYYYMMDD]".to_string(),
        ad_group_ad_table: "ad_group_ads_[YYYYMMDD]".to_string(),
        chunk_size: NonZeroUsize::new(7).unwrap_or(NonZeroUsize::MIN),
    }
}

/// Create a pending FetchAccount task for testing.
pub fn make_test_task() -> RefreshTask {
    let payload = TaskPayload::FetchAccount {
        kind: EntityKind::Campaign,
        account_id: "1234567890".to_string(),
        date: Utc::now().date_naive(),
    };
    RefreshTask {
        id: Uuid::new_v4(),
        dedup_key: payload.dedup_key(),
        payload,
        status: TaskStatus::Pending,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: 3,
        next_retry_at: None,
        error_message: None,
        summary: None,
        worker_id: None,
    }
}
