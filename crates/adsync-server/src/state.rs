use std::sync::Arc;

use adsync_client::{BigQueryWarehouse, GcsObjectStore, GoogleAdsClient};
use adsync_core::Orchestrator;
use adsync_db::{Database, RefreshTaskRepository};

/// The orchestrator wired to the production adapters.
pub type LiveOrchestrator =
    Orchestrator<GoogleAdsClient, GcsObjectStore, BigQueryWarehouse, RefreshTaskRepository>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    /// Shared with the embedded worker so the roster cache is common to both.
    pub orchestrator: Arc<LiveOrchestrator>,
    pub db: Database,
    /// Bearer token required on every `/v1` route.
    pub api_key: String,
}
