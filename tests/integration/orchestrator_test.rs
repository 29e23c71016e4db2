//! Task Orchestrator Integration Tests
//!
//! Lifecycle tests against real files with scripted model replies:
//! - Unique ids across active and archived tasks
//! - Sequential halt and all-success paths
//! - Unknown step types never reach the model
//! - Resume, cancellation, the in-process execution guard
//! - Recovery of tasks interrupted by a previous process
//! - Store write failures never leave a task `running`

use std::collections::HashSet;

use serde_json::{json, Map};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use opsdesk::storage::{Collection, TaskStore};
use opsdesk::utils::error::AppError;
use opsdesk_core::{ExecutionOutcome, StepResult, StepStatus, TaskStatus};

use crate::support::{
    block_active_file, network_error, ok, orchestrator, plan, GatedClient, PendingClient,
    ScriptedClient, StoreBreakingClient,
};

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_task_ids_unique_across_active_and_history() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![
        ok("[]"),
        ok("[]"),
        ok("[]"),
        ok("[]"),
    ]);
    let orch = orchestrator(dir.path(), client);

    let first = orch.create_task("Audit sudoers", Map::new()).await.unwrap();
    orch.execute_task(&first.task_id).await.unwrap();
    let second = orch.create_task("Patch openssl", Map::new()).await.unwrap();
    orch.archive_task(&second.task_id).await.unwrap();
    let third = orch.create_task("Renew TLS certs", Map::new()).await.unwrap();
    drop(orch);

    // A fresh process must not reuse any id.
    let orch = orchestrator(dir.path(), ScriptedClient::new(vec![ok("[]")]));
    let fourth = orch.create_task("Rotate SSH keys", Map::new()).await.unwrap();

    let ids: HashSet<_> = [&first, &second, &third, &fourth]
        .iter()
        .map(|t| t.task_id.clone())
        .collect();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_unparsable_plan_still_creates_task() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok("I would start by checking the logs.")]);
    let orch = orchestrator(dir.path(), client);

    let mut context = Map::new();
    context.insert("severity".to_string(), json!("P2"));
    let task = orch.create_task("Investigate 5xx spike", context).await.unwrap();

    assert!(task.steps.is_empty());
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.context["severity"], json!("P2"));
    assert_eq!(orch.get_active_tasks().await.len(), 1);
}

#[tokio::test]
async fn test_planner_error_still_creates_empty_task() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![network_error("connection refused")]);
    let orch = orchestrator(dir.path(), client);

    let task = orch.create_task("Check DNS", Map::new()).await.unwrap();
    assert!(task.steps.is_empty());
    assert_eq!(task.status, TaskStatus::Pending);

    let reopened = TaskStore::open(dir.path()).unwrap();
    assert!(reopened.find(Collection::Active, &task.task_id).is_some());
}

#[tokio::test]
async fn test_cancelled_creation_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(dir.path(), std::sync::Arc::new(PendingClient));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = orch
        .create_task_with_cancel("Check DNS", Map::new(), &cancel)
        .await;

    assert!(matches!(result, Err(AppError::Cancelled(_))));
    assert!(orch.get_active_tasks().await.is_empty());
}

// ============================================================================
// Execution state machine
// ============================================================================

#[tokio::test]
async fn test_failed_step_halts_and_task_stays_active() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![
        ok(plan(&["analysis", "action", "analysis"])),
        ok("disk usage at 97%"),
        network_error("upstream timeout"),
        ok("never used"),
    ]);
    let orch = orchestrator(dir.path(), client.clone());

    let task = orch.create_task("Free disk on db-02", Map::new()).await.unwrap();
    let outcome = orch.execute_task(&task.task_id).await.unwrap();

    match &outcome {
        ExecutionOutcome::Error {
            step_id, error, ..
        } => {
            assert_eq!(step_id.as_deref(), Some("step_2"));
            assert!(error.contains("upstream timeout"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let stored = orch.get_task(&task.task_id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.steps[0].status, StepStatus::Completed);
    assert_eq!(stored.steps[1].status, StepStatus::Failed);
    assert_eq!(stored.steps[2].status, StepStatus::Pending);
    assert!(stored.steps[2].result.is_none());
    assert_eq!(stored.result.as_ref(), Some(&outcome));
    assert_eq!(client.calls(), 3);

    assert!(orch.get_task_history().await.is_empty());
    assert_eq!(orch.get_active_tasks().await.len(), 1);

    // The same state is on disk.
    let store = TaskStore::open(dir.path()).unwrap();
    let persisted = store.find(Collection::Active, &task.task_id).unwrap();
    assert_eq!(persisted, &stored);
}

#[tokio::test]
async fn test_all_steps_succeed_and_task_is_archived() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![
        ok(plan(&["analysis", "action"])),
        ok(r#"{"stale_locks": 2}"#),
        ok("locks cleared"),
    ]);
    let orch = orchestrator(dir.path(), client.clone());

    let task = orch.create_task("Clear stale locks", Map::new()).await.unwrap();
    let outcome = orch.execute_task(&task.task_id).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::completed(&task.task_id));

    assert!(orch.get_active_tasks().await.is_empty());
    let history = orch.get_task_history().await;
    assert_eq!(history.len(), 1);

    let archived = &history[0];
    assert_eq!(archived.status, TaskStatus::Completed);
    assert!(archived.completed_at.unwrap() >= archived.created_at);
    assert_eq!(
        archived.steps[0].result,
        Some(StepResult::success(json!({"stale_locks": 2})))
    );
    assert_eq!(
        archived.steps[1].result,
        Some(StepResult::success("locks cleared"))
    );

    // The second step saw the first step's output.
    assert!(client.prompts()[2].contains("stale_locks"));
}

#[tokio::test]
async fn test_unknown_step_type_never_calls_model() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok(plan(&["unsupported", "analysis"]))]);
    let orch = orchestrator(dir.path(), client.clone());

    let task = orch.create_task("Do something odd", Map::new()).await.unwrap();
    let outcome = orch.execute_task(&task.task_id).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(client.calls(), 1);

    let stored = orch.get_task(&task.task_id).await.unwrap();
    assert_eq!(stored.steps[0].status, StepStatus::Failed);
    assert!(stored.steps[0]
        .error_message()
        .unwrap()
        .contains("Unknown step type"));
    assert_eq!(stored.steps[1].status, StepStatus::Pending);
}

#[tokio::test]
async fn test_zero_step_task_completes_immediately() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok("not json")]);
    let orch = orchestrator(dir.path(), client.clone());

    let task = orch.create_task("Nothing to do", Map::new()).await.unwrap();
    let outcome = orch.execute_task(&task.task_id).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(client.calls(), 1);
    assert!(orch.get_task_history().await[0].completed_at.is_some());
}

#[tokio::test]
async fn test_rerun_resumes_at_failed_step() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![
        ok(plan(&["analysis", "action", "action"])),
        ok("found runaway cron job"),
        network_error("rate limited"),
        ok("cron job disabled"),
        ok("load back to normal"),
    ]);
    let orch = orchestrator(dir.path(), client.clone());

    let task = orch.create_task("Reduce load on app-03", Map::new()).await.unwrap();
    let first = orch.execute_task(&task.task_id).await.unwrap();
    assert!(!first.is_success());

    let second = orch.execute_task(&task.task_id).await.unwrap();
    assert!(second.is_success());
    assert_eq!(client.calls(), 5);

    let archived = orch.get_task(&task.task_id).await.unwrap();
    assert_eq!(archived.status, TaskStatus::Completed);
    assert_eq!(
        archived.steps[0].result,
        Some(StepResult::success("found runaway cron job"))
    );
    assert_eq!(
        archived.steps[1].result,
        Some(StepResult::success("cron job disabled"))
    );
}

#[tokio::test]
async fn test_execute_unknown_and_archived_tasks() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok("[]")]);
    let orch = orchestrator(dir.path(), client);

    assert!(matches!(
        orch.execute_task("task_99").await,
        Err(AppError::NotFound(_))
    ));

    let task = orch.create_task("Close stale tickets", Map::new()).await.unwrap();
    orch.archive_task(&task.task_id).await.unwrap();
    assert!(matches!(
        orch.execute_task(&task.task_id).await,
        Err(AppError::Conflict(_))
    ));
}

// ============================================================================
// Archival
// ============================================================================

#[tokio::test]
async fn test_archive_twice_is_noop() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok(plan(&["analysis"]))]);
    let orch = orchestrator(dir.path(), client);

    let task = orch.create_task("Review firewall rules", Map::new()).await.unwrap();

    let first = orch.archive_task(&task.task_id).await.unwrap();
    assert!(first.unwrap().completed_at.is_some());
    let history_after_first = orch.get_task_history().await;

    let second = orch.archive_task(&task.task_id).await.unwrap();
    assert!(second.is_none());
    assert_eq!(orch.get_task_history().await, history_after_first);
    assert!(orch.get_active_tasks().await.is_empty());

    assert!(orch.archive_task("task_404").await.unwrap().is_none());
}

// ============================================================================
// Concurrency and cancellation
// ============================================================================

#[tokio::test]
async fn test_concurrent_execution_of_same_task_rejected() {
    let dir = TempDir::new().unwrap();
    let client = GatedClient::new();
    let orch = orchestrator(dir.path(), client.clone());
    let task = orch.create_task("Drain node", Map::new()).await.unwrap();

    let (outcome, (overlap, archive, snapshot)) = tokio::join!(
        orch.execute_task(&task.task_id),
        async {
            client.entered.notified().await;
            let overlap = orch.execute_task(&task.task_id).await;
            let archive = orch.archive_task(&task.task_id).await;
            let snapshot = orch.get_task(&task.task_id).await;
            client.release.notify_one();
            (overlap, archive, snapshot)
        }
    );

    assert!(matches!(overlap, Err(AppError::Conflict(_))));
    assert!(matches!(archive, Err(AppError::Conflict(_))));

    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Running);
    assert_eq!(snapshot.steps[0].status, StepStatus::Running);

    assert!(outcome.unwrap().is_success());
    assert!(!orch.is_executing(&task.task_id));
}

#[tokio::test]
async fn test_cancelled_step_fails_task() {
    let dir = TempDir::new().unwrap();
    let client = GatedClient::new();
    let orch = orchestrator(dir.path(), client.clone());
    let task = orch.create_task("Reindex search", Map::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let (outcome, _) = tokio::join!(
        orch.execute_task_with_cancel(&task.task_id, &cancel),
        async {
            client.entered.notified().await;
            cancel.cancel();
        }
    );

    match outcome.unwrap() {
        ExecutionOutcome::Error { error, .. } => assert_eq!(error, "cancelled"),
        other => panic!("expected cancellation, got {:?}", other),
    }

    let stored = orch.get_task(&task.task_id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.steps[0].error_message(), Some("cancelled"));
}

// ============================================================================
// Crash recovery
// ============================================================================

#[tokio::test]
async fn test_interrupted_task_marked_failed_on_open() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok(plan(&["analysis", "action"]))]);
    let task_id = {
        let orch = orchestrator(dir.path(), client);
        orch.create_task("Migrate volume", Map::new()).await.unwrap().task_id
    };

    // Simulate a process that died mid-step.
    {
        let mut store = TaskStore::open(dir.path()).unwrap();
        let mut task = store.find(Collection::Active, &task_id).unwrap().clone();
        task.status = TaskStatus::Running;
        task.steps[0].mark_running(chrono::Utc::now());
        store.replace(Collection::Active, task).unwrap();
    }

    let orch = orchestrator(dir.path(), ScriptedClient::new(vec![]));
    let recovered = orch.get_task(&task_id).await.unwrap();
    assert_eq!(recovered.status, TaskStatus::Failed);
    assert_eq!(recovered.steps[0].status, StepStatus::Failed);
    assert_eq!(
        recovered.steps[0].error_message(),
        Some("interrupted before completion")
    );
    assert_eq!(recovered.steps[1].status, StepStatus::Pending);
}

// ============================================================================
// Store write failures
// ============================================================================

#[tokio::test]
async fn test_write_failure_at_start_leaves_task_pending() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![ok(plan(&["analysis"]))]);
    let orch = orchestrator(dir.path(), client.clone());
    let task = orch.create_task("Check disk usage", Map::new()).await.unwrap();

    block_active_file(dir.path());
    let result = orch.execute_task(&task.task_id).await;
    assert!(matches!(result, Err(AppError::Io(_))));

    let after = orch.get_task(&task.task_id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Pending);
    assert_eq!(after.steps[0].status, StepStatus::Pending);
    assert!(!orch.is_executing(&task.task_id));
    // Planning only; no step reached the model.
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_write_failure_mid_execution_fails_task() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(dir.path(), StoreBreakingClient::new(dir.path()));
    let task = orch.create_task("Check disk usage", Map::new()).await.unwrap();

    let result = orch.execute_task(&task.task_id).await;
    assert!(matches!(result, Err(AppError::Io(_))));

    let after = orch.get_task(&task.task_id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Failed);
    assert!(after.steps.iter().all(|s| s.status != StepStatus::Running));
    match after.result {
        Some(ExecutionOutcome::Error { error, .. }) => {
            assert!(error.contains("could not be saved"));
        }
        other => panic!("expected an error outcome, got {:?}", other),
    }
    assert!(!orch.is_executing(&task.task_id));
    assert_eq!(orch.get_task_history().await.len(), 0);
}
