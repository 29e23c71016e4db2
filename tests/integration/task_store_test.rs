//! Task Store Integration Tests
//!
//! Persistence behavior against real files:
//! - Save/load round trip including nested step timestamps
//! - Corrupt file quarantine without raising
//! - Legacy offset-less timestamps
//! - Write failures surfaced to the caller

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Map};
use tempfile::TempDir;

use opsdesk::storage::{Collection, TaskStore};
use opsdesk::utils::error::AppError;
use opsdesk_core::{ExecutionOutcome, Step, StepKind, StepResult, StepStatus, Task, TaskStatus};

// ============================================================================
// Helpers
// ============================================================================

fn sample_task(id: &str) -> Task {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
        + Duration::nanoseconds(123_456_789);
    let mut params = Map::new();
    params.insert("unit".to_string(), json!("nginx.service"));

    let mut steps = vec![
        Step::planned(1, "Read journal", StepKind::Analysis, params, created),
        Step::planned(2, "Restart unit", StepKind::Action, Map::new(), created),
    ];
    steps[0].finish(
        StepResult::success(json!({"errors": 3})),
        created + Duration::seconds(4),
    );

    let mut context = Map::new();
    context.insert("host".to_string(), json!("web-01"));
    let mut task = Task::new(id, "Restart failing nginx", context, steps, created);
    task.status = TaskStatus::Failed;
    task.result = Some(ExecutionOutcome::step_failed(id, "step_2", "timeout"));
    task
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_round_trip_preserves_every_field() {
    let dir = TempDir::new().unwrap();
    let original = sample_task("task_1");
    {
        let mut store = TaskStore::open(dir.path()).unwrap();
        store.insert(Collection::Active, original.clone()).unwrap();
    }

    let store = TaskStore::open(dir.path()).unwrap();
    let loaded = store.find(Collection::Active, "task_1").unwrap();
    assert_eq!(loaded, &original);
    assert_eq!(loaded.steps[0].updated_at, original.steps[0].updated_at);
}

#[test]
fn test_round_trip_after_move_keeps_completed_at() {
    let dir = TempDir::new().unwrap();
    let task = sample_task("task_1");
    let archived_at = task.created_at + Duration::minutes(5);
    {
        let mut store = TaskStore::open(dir.path()).unwrap();
        store.insert(Collection::Active, task).unwrap();
        store
            .move_task("task_1", Collection::Active, Collection::History, archived_at)
            .unwrap();
    }

    let store = TaskStore::open(dir.path()).unwrap();
    assert!(store.tasks(Collection::Active).is_empty());
    let archived = store.find(Collection::History, "task_1").unwrap();
    assert_eq!(archived.completed_at, Some(archived_at));
    assert!(archived.completed_at.unwrap() >= archived.created_at);
}

#[test]
fn test_legacy_timestamps_load_as_utc() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("active_tasks.json"),
        r#"[{
            "task_id": "task_7",
            "description": "Check backups",
            "context": {},
            "status": "pending",
            "steps": [{
                "id": "step_1",
                "description": "List snapshots",
                "type": "analysis",
                "parameters": {},
                "status": "pending",
                "created_at": "2024-05-01T12:00:00.250000",
                "updated_at": "2024-05-01T12:00:00.250000"
            }],
            "created_at": "2024-05-01T12:00:00.250000",
            "updated_at": "2024-05-01T12:00:00.250000"
        }]"#,
    )
    .unwrap();

    let store = TaskStore::open(dir.path()).unwrap();
    let task = store.find(Collection::Active, "task_7").unwrap();
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::milliseconds(250);
    assert_eq!(task.created_at, expected);
    assert_eq!(task.steps[0].status, StepStatus::Pending);
}

// ============================================================================
// Corruption recovery
// ============================================================================

#[test]
fn test_malformed_active_file_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let active = dir.path().join("active_tasks.json");
    std::fs::write(&active, "[{\"task_id\": \"task_1\", ").unwrap();

    let store = TaskStore::open(dir.path()).unwrap();
    assert!(store.load(Collection::Active).is_empty());
    assert!(store.tasks(Collection::Active).is_empty());

    let backup = dir.path().join("active_tasks.json.bak");
    assert_eq!(
        std::fs::read_to_string(backup).unwrap(),
        "[{\"task_id\": \"task_1\", "
    );
    assert_eq!(std::fs::read_to_string(&active).unwrap().trim(), "[]");
}

#[test]
fn test_wrong_shape_is_quarantined() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("task_history.json"), r#"{"tasks": []}"#).unwrap();

    let store = TaskStore::open(dir.path()).unwrap();
    assert!(store.tasks(Collection::History).is_empty());
    assert!(dir.path().join("task_history.json.bak").exists());
}

#[test]
fn test_blank_file_is_empty_not_corrupt() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("active_tasks.json"), "  \n").unwrap();

    let store = TaskStore::open(dir.path()).unwrap();
    assert!(store.tasks(Collection::Active).is_empty());
    assert!(!dir.path().join("active_tasks.json.bak").exists());
}

// ============================================================================
// Write failures
// ============================================================================

#[test]
fn test_write_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut store = TaskStore::open(dir.path()).unwrap();

    // A non-empty directory where the file should be makes the rename fail.
    let active = dir.path().join("active_tasks.json");
    std::fs::remove_file(&active).unwrap();
    std::fs::create_dir(&active).unwrap();
    std::fs::write(active.join("blocker"), "x").unwrap();

    let result = store.insert(Collection::Active, sample_task("task_1"));
    assert!(matches!(result, Err(AppError::Io(_))));
    assert!(store.find(Collection::Active, "task_1").is_none());
}
