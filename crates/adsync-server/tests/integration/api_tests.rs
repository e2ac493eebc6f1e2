use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

use adsync_core::task::TaskStatus;
use adsync_core::task_queue::TaskQueue;
use adsync_server::startup;

use crate::integration::common::{MCC_ID, TestApp, setup_test_app};

async fn get(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(uri)
                .header("authorization", app.auth_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Roster of three accounts under the manager, plus permissive storage and
/// warehouse fakes.
async fn mount_roster(app: &TestApp) {
    Mock::given(method("POST"))
        .and(path(format!("/v21/customers/{MCC_ID}/googleAds:search")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"customerClientLink": {"clientCustomer": "customers/1", "status": "ACTIVE"}},
                {"customerClientLink": {"clientCustomer": "customers/2", "status": "ACTIVE"}},
                {"customerClientLink": {"clientCustomer": "customers/3", "status": "INACTIVE"}}
            ]
        })))
        .mount(&app.ads)
        .await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/bigquery/v2/projects/proj/datasets/ads/tables/.+$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&app.cloud)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/staging"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "staging"})))
        .mount(&app.cloud)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/staging/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&app.cloud)
        .await;
    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/proj/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jobReference": {"jobId": "load_accounts"},
            "status": {"state": "DONE"}
        })))
        .mount(&app.cloud)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/bigquery/v2/projects/proj/datasets/ads/tables/accounts_\d{8}$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"numRows": "3"})))
        .mount(&app.cloud)
        .await;
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/tasks").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/v1/get_all")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.db.task_repo().list_tasks(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn dependent_stage_without_roster_is_skipped() {
    let app = setup_test_app().await;

    let (status, json) = get(&app, "/v1/get_campaigns").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "skipped");
    assert_eq!(json["status"], "Campaigns: skipped, no roster loaded");
    assert_eq!(app.ads.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn customers_then_campaigns_enqueues_eligible_accounts() {
    let app = setup_test_app().await;
    mount_roster(&app).await;

    let (status, json) = get(&app, "/v1/get_customers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accounts"].as_array().unwrap().len(), 3);
    assert!(json["status"].as_str().unwrap().starts_with("Customers: loaded 3 records"));

    let (status, json) = get(&app, "/v1/get_campaigns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "enqueued");
    assert_eq!(json["tasks"], 2);

    let (_, json) = get(&app, "/v1/get_adgroups").await;
    assert_eq!(json["tasks"], 2);

    let pending = app
        .db
        .task_repo()
        .count_by_status(TaskStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending, 4);
}

#[tokio::test]
async fn startup_roster_lets_dependent_stages_dispatch() {
    let app = setup_test_app().await;
    mount_roster(&app).await;

    assert!(startup::load_roster(&app.orchestrator).await);

    let (status, json) = get(&app, "/v1/get_adgroupads").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "enqueued");
    assert_eq!(json["tasks"], 2);
}

#[tokio::test]
async fn failed_startup_roster_load_is_not_fatal() {
    let app = setup_test_app().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"code": 500, "message": "Internal error encountered."}
        })))
        .mount(&app.ads)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&app.cloud)
        .await;

    assert!(!startup::load_roster(&app.orchestrator).await);

    let (status, json) = get(&app, "/v1/get_campaigns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "skipped");
}

#[tokio::test]
async fn clear_drops_the_roster() {
    let app = setup_test_app().await;
    mount_roster(&app).await;

    get(&app, "/v1/get_customers").await;
    let (status, json) = get(&app, "/v1/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Roster cleared");

    let (_, json) = get(&app, "/v1/get_adgroupads").await;
    assert_eq!(json["outcome"], "skipped");
}

#[tokio::test]
async fn upstream_failure_maps_to_502() {
    let app = setup_test_app().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&app.cloud)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&app.cloud)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"code": 500, "message": "Internal error encountered."}
        })))
        .mount(&app.ads)
        .await;

    let (status, json) = get(&app, "/v1/get_customers").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "upstream_error");
}

#[tokio::test]
async fn get_all_enqueues_one_full_cycle() {
    let app = setup_test_app().await;

    let (status, first) = get(&app, "/v1/get_all").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["status"], "pending");

    let (_, second) = get(&app, "/v1/get_all").await;
    assert_eq!(first["task_id"], second["task_id"]);

    let task_id = first["task_id"].as_str().unwrap();
    let (status, task) = get(&app, &format!("/v1/tasks/{task_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["dedup_key"], "full_cycle");
    assert_eq!(task["payload"]["type"], "full_cycle");
}

#[tokio::test]
async fn list_tasks_filters_by_status() {
    let app = setup_test_app().await;
    get(&app, "/v1/get_all").await;

    let (_, json) = get(&app, "/v1/tasks?status=pending").await;
    assert_eq!(json["total"], 1);

    let (_, json) = get(&app, "/v1/tasks?status=completed").await;
    assert_eq!(json["total"], 0);

    let (status, json) = get(&app, "/v1/tasks?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn missing_task_returns_404() {
    let app = setup_test_app().await;

    let (status, json) = get(&app, &format!("/v1/tasks/{}", uuid::Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn cancel_pending_task() {
    let app = setup_test_app().await;
    let (_, created) = get(&app, "/v1/get_all").await;
    let task_id = created["task_id"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::delete(format!("/v1/tasks/{task_id}"))
                .header("authorization", app.auth_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, task) = get(&app, &format!("/v1/tasks/{task_id}")).await;
    assert_eq!(task["status"], "cancelled");
}
