use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use wiremock::MockServer;

use adsync_client::{
    AccessTokenProvider, BigQueryWarehouse, GcsObjectStore, GoogleAdsClient, GoogleAdsCredentials,
};
use adsync_core::{Orchestrator, PipelineConfig};
use adsync_db::Database;
use adsync_server::routes;
use adsync_server::state::{AppState, LiveOrchestrator};

pub const TEST_API_KEY: &str = "test-secret-key";
pub const MCC_ID: &str = "999";

/// Router plus the fakes behind it. Dropping the container stops PostgreSQL.
pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub orchestrator: Arc<LiveOrchestrator>,
    /// Stands in for the ads search API.
    pub ads: MockServer,
    /// Stands in for Cloud Storage and BigQuery.
    pub cloud: MockServer,
    _container: ContainerAsync<GenericImage>,
}

impl TestApp {
    pub fn auth_header(&self) -> String {
        format!("Bearer {TEST_API_KEY}")
    }
}

/// Spin up PostgreSQL and HTTP fakes and return the wired test app.
pub async fn setup_test_app() -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "adsync_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/adsync_test");
    let db = Database::from_pool(retry_connect(&url).await);
    db.migrate().await.expect("Failed to run migrations");

    let ads = MockServer::start().await;
    let cloud = MockServer::start().await;

    let credentials = GoogleAdsCredentials {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        refresh_token: "refresh".into(),
        developer_token: "dev".into(),
        login_customer_id: Some(MCC_ID.into()),
    };
    let tokens = AccessTokenProvider::static_token("test-token").expect("token provider");

    let api = GoogleAdsClient::with_tokens(&credentials, tokens.clone())
        .expect("ads client")
        .with_base_url(ads.uri());
    let store = GcsObjectStore::new("proj", tokens.clone())
        .expect("storage client")
        .with_base_url(cloud.uri());
    let warehouse = BigQueryWarehouse::new("proj", tokens)
        .expect("bigquery client")
        .with_base_url(cloud.uri())
        .with_poll_interval(Duration::from_millis(10));

    let config = PipelineConfig::from_lookup(|key| {
        match key {
            "ADSYNC_PROJECT" => Some("proj"),
            "ADSYNC_DATASET" => Some("ads"),
            "ADSYNC_BUCKET" => Some("staging"),
            "ADSYNC_MCC_ID" => Some(MCC_ID),
            _ => None,
        }
        .map(str::to_string)
    })
    .expect("pipeline config");

    let orchestrator = Arc::new(Orchestrator::new(api, store, warehouse, db.task_repo(), config));
    let state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
        db: db.clone(),
        api_key: TEST_API_KEY.to_string(),
    });

    TestApp {
        router: routes::router(state),
        db,
        orchestrator,
        ads,
        cloud,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}
