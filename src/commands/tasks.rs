//! Task Commands
//!
//! UI-facing operations over the task orchestrator. Every command returns a
//! `CommandResponse`; errors are rendered to text verbatim so step failure
//! reasons reach the operator unchanged. The UI re-fetches after mutations.

use serde_json::{Map, Value};

use crate::models::response::CommandResponse;
use crate::models::{ExecutionOutcome, Task, TaskSummary};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// List tasks in the active collection
pub async fn list_active_tasks(state: &AppState) -> CommandResponse<Vec<Task>> {
    match state.orchestrator().await {
        Ok(orchestrator) => CommandResponse::ok(orchestrator.get_active_tasks().await),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Compact rows for the active task list
pub async fn list_task_summaries(state: &AppState) -> CommandResponse<Vec<TaskSummary>> {
    match state.orchestrator().await {
        Ok(orchestrator) => CommandResponse::ok(orchestrator.list_task_summaries().await),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Get one task from active or history. A missing id yields `data: null`.
pub async fn get_task(task_id: String, state: &AppState) -> CommandResponse<Option<Task>> {
    match state.orchestrator().await {
        Ok(orchestrator) => CommandResponse::ok(orchestrator.get_task(&task_id).await),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// List archived tasks
pub async fn get_task_history(state: &AppState) -> CommandResponse<Vec<Task>> {
    match state.orchestrator().await {
        Ok(orchestrator) => CommandResponse::ok(orchestrator.get_task_history().await),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Plan and store a new task
///
/// `context_json`, when given, must be a JSON object.
pub async fn create_task(
    description: String,
    context_json: Option<String>,
    state: &AppState,
) -> CommandResponse<Task> {
    if description.trim().is_empty() {
        return CommandResponse::err(AppError::validation("Task description cannot be empty").to_string());
    }

    let context = match parse_context(context_json.as_deref()) {
        Ok(context) => context,
        Err(e) => return CommandResponse::err(e.to_string()),
    };

    let result = async {
        let orchestrator = state.orchestrator().await?;
        orchestrator
            .create_task_with_cancel(&description, context, &state.creation_token())
            .await
    }
    .await;

    CommandResponse::from(result)
}

/// Run a task's steps and return the outcome
pub async fn execute_task(task_id: String, state: &AppState) -> CommandResponse<ExecutionOutcome> {
    let Some(scope) = state.begin_execution(&task_id) else {
        return CommandResponse::err(
            AppError::conflict(format!("Task {} is already executing", task_id)).to_string(),
        );
    };

    let result = async {
        let orchestrator = state.orchestrator().await?;
        orchestrator
            .execute_task_with_cancel(&task_id, scope.token())
            .await
    }
    .await;

    CommandResponse::from(result)
}

/// Move a task to history. Unknown or archived ids return `data: null`.
pub async fn archive_task(task_id: String, state: &AppState) -> CommandResponse<Option<Task>> {
    let result = async {
        let orchestrator = state.orchestrator().await?;
        orchestrator.archive_task(&task_id).await
    }
    .await;

    CommandResponse::from(result)
}

/// Cancel an in-flight execution. `data` is whether one was running.
pub async fn cancel_execution(task_id: String, state: &AppState) -> CommandResponse<bool> {
    CommandResponse::ok(state.cancel_execution(&task_id))
}

/// Parse optional context JSON into an object map
pub fn parse_context(context_json: Option<&str>) -> AppResult<Map<String, Value>> {
    let Some(raw) = context_json.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(Map::new());
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::validation("Task context must be a JSON object")),
        Err(e) => Err(AppError::validation(format!("Invalid task context JSON: {}", e))),
    }
}
