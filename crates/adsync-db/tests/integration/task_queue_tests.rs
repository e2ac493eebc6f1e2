use adsync_core::models::EntityKind;
use adsync_core::task::{CreateTaskRequest, TaskPayload, TaskStatus};
use adsync_core::task_queue::TaskQueue;
use adsync_db::RefreshTaskRepository;
use chrono::NaiveDate;

use crate::integration::common::setup_test_db;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn fetch_request(account_id: &str) -> CreateTaskRequest {
    CreateTaskRequest::fetch_account(EntityKind::Campaign, account_id, date())
}

#[tokio::test]
async fn create_task_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let task = repo.create_task(fetch_request("42")).await.unwrap();

    assert_eq!(task.dedup_key, "fetch:campaign:42:20261019");
    assert_eq!(
        task.payload,
        TaskPayload::FetchAccount {
            kind: EntityKind::Campaign,
            account_id: "42".into(),
            date: date(),
        }
    );
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 0);
    assert_eq!(task.max_retries, 3);
    assert!(task.worker_id.is_none());
    assert!(task.started_at.is_none());
    assert!(task.summary.is_none());
}

#[tokio::test]
async fn create_task_with_custom_max_retries() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let task = repo
        .create_task(CreateTaskRequest::new(TaskPayload::FullCycle).with_max_retries(0))
        .await
        .unwrap();

    assert_eq!(task.max_retries, 0);
    assert_eq!(task.dedup_key, "full_cycle");
}

#[tokio::test]
async fn create_task_returns_active_duplicate() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let first = repo.create_task(fetch_request("42")).await.unwrap();
    let second = repo.create_task(fetch_request("42")).await.unwrap();
    assert_eq!(first.id, second.id);

    // Still deduplicated while running.
    repo.claim_task("worker-1").await.unwrap();
    let third = repo.create_task(fetch_request("42")).await.unwrap();
    assert_eq!(first.id, third.id);

    assert_eq!(repo.list_tasks(None, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_task_after_completion_enqueues_again() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let first = repo.create_task(fetch_request("42")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();
    repo.complete_task(first.id, "Campaigns: 10 records").await.unwrap();

    let second = repo.create_task(fetch_request("42")).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status, TaskStatus::Pending);
}

#[tokio::test]
async fn claim_task_sets_running_and_worker() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    repo.create_task(fetch_request("42")).await.unwrap();

    let claimed = repo
        .claim_task("worker-1")
        .await
        .unwrap()
        .expect("Should claim the task");

    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());
}

#[tokio::test]
async fn claim_task_returns_none_when_empty() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    assert!(repo.claim_task("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_claims_never_share_a_task() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    for id in ["1", "2", "3"] {
        repo.create_task(fetch_request(id)).await.unwrap();
    }

    let (a, b, c, d) = tokio::join!(
        repo.claim_task("w-a"),
        repo.claim_task("w-b"),
        repo.claim_task("w-c"),
        repo.claim_task("w-d"),
    );
    let mut claimed: Vec<_> = [a, b, c, d]
        .into_iter()
        .filter_map(|r| r.unwrap())
        .map(|t| t.id)
        .collect();
    claimed.sort();
    claimed.dedup();

    assert_eq!(claimed.len(), 3);
}

#[tokio::test]
async fn claim_task_respects_retry_time() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let task = repo.create_task(fetch_request("42")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();

    let next_retry = chrono::Utc::now() + chrono::TimeDelta::minutes(5);
    repo.fail_task(task.id, "Rate limit exceeded", Some(next_retry))
        .await
        .unwrap();

    assert!(repo.claim_task("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn complete_task_stores_summary() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let task = repo.create_task(fetch_request("42")).await.unwrap();
    let claimed = repo.claim_task("worker-1").await.unwrap().unwrap();

    repo.complete_task(claimed.id, "Campaigns: 45000 records in 3 blobs")
        .await
        .unwrap();

    let updated = repo.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Completed);
    assert_eq!(
        updated.summary.as_deref(),
        Some("Campaigns: 45000 records in 3 blobs")
    );
    assert!(updated.completed_at.is_some());
    assert!(updated.worker_id.is_none());
}

#[tokio::test]
async fn fail_task_with_retry_resets_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let task = repo.create_task(fetch_request("42")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();

    let next_retry = chrono::Utc::now() + chrono::TimeDelta::minutes(1);
    repo.fail_task(task.id, "temporary error", Some(next_retry))
        .await
        .unwrap();

    let updated = repo.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Pending);
    assert_eq!(updated.retry_count, 1);
    assert!(updated.next_retry_at.is_some());
    assert_eq!(updated.error_message.as_deref(), Some("temporary error"));
    assert!(updated.worker_id.is_none());
}

#[tokio::test]
async fn fail_task_without_retry_marks_failed() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let task = repo.create_task(fetch_request("42")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();

    repo.fail_task(task.id, "permanent error", None).await.unwrap();

    let updated = repo.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Failed);
    assert_eq!(updated.retry_count, 0);
    assert_eq!(updated.error_message.as_deref(), Some("permanent error"));
}

#[tokio::test]
async fn cancel_task_ignores_completed() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    let pending = repo.create_task(fetch_request("1")).await.unwrap();
    repo.cancel_task(pending.id).await.unwrap();
    let updated = repo.get_task(pending.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Cancelled);

    let done = repo.create_task(fetch_request("2")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();
    repo.complete_task(done.id, "ok").await.unwrap();
    repo.cancel_task(done.id).await.unwrap();

    let updated = repo.get_task(done.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Completed);
}

#[tokio::test]
async fn release_worker_tasks_on_shutdown() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    repo.create_task(fetch_request("1")).await.unwrap();
    repo.create_task(fetch_request("2")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();
    repo.claim_task("worker-1").await.unwrap();

    let released = repo.release_worker_tasks("worker-1").await.unwrap();
    assert_eq!(released, 2);
    assert_eq!(repo.count_by_status(TaskStatus::Pending).await.unwrap(), 2);
    assert_eq!(repo.count_by_status(TaskStatus::Running).await.unwrap(), 0);
}

#[tokio::test]
async fn list_tasks_with_status_filter() {
    let (pool, _container) = setup_test_db().await;
    let repo = RefreshTaskRepository::new(pool);

    repo.create_task(fetch_request("1")).await.unwrap();
    repo.create_task(fetch_request("2")).await.unwrap();
    repo.claim_task("worker-1").await.unwrap();

    let pending = repo.list_tasks(Some(TaskStatus::Pending), 10).await.unwrap();
    assert_eq!(pending.len(), 1);

    let running = repo.list_tasks(Some(TaskStatus::Running), 10).await.unwrap();
    assert_eq!(running.len(), 1);

    let all = repo.list_tasks(None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
}
