//! Work done once when the server comes up.

use crate::state::LiveOrchestrator;

/// Load the account roster so dependent stages dispatch without a prior
/// `/v1/get_customers` call. A failure is logged and leaves the roster empty.
pub async fn load_roster(orchestrator: &LiveOrchestrator) -> bool {
    match orchestrator.refresh_accounts().await {
        Ok(refresh) => {
            tracing::info!(
                accounts = refresh.context.accounts.len(),
                status = %refresh.report,
                "Roster loaded on startup"
            );
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Startup roster load failed, /v1/get_customers retries it");
            false
        }
    }
}
