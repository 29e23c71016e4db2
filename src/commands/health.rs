//! Health Check Commands
//!
//! Commands for checking the health status of backend services.

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::AppState;

/// Get the health status of all backend services
pub async fn get_health(state: &AppState) -> CommandResponse<HealthResponse> {
    let mut health = HealthResponse::default();

    // Check config health
    health.config = state.is_config_healthy();

    // Task store is usable once the orchestrator is up
    if let Ok(orchestrator) = state.orchestrator().await {
        let (active, archived) = orchestrator.task_counts().await;
        health.task_store = true;
        health.active_tasks = active;
        health.archived_tasks = archived;
    }

    health.data_dir = state
        .data_dir()
        .await
        .map(|dir| dir.display().to_string());
    health.completion_client = state.completion_client_label().await;

    // Overall status
    health.status = if health.config && health.task_store {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    CommandResponse::ok(health)
}
