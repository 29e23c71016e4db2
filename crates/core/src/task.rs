//! Task and Step Records
//!
//! The persisted shape of orchestrated work. A `Task` owns an ordered list of
//! `Step`s; insertion order is execution order and is never changed after
//! planning. Status fields move `pending -> running -> completed | failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::timestamp;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle status of a single step, tracked independently of its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What kind of work a step asks the model for.
///
/// Planner output is free text, so anything other than `analysis` or `action`
/// is kept verbatim in `Unrecognized` and fails when the step is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Analysis,
    Action,
    Unrecognized(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Analysis => "analysis",
            StepKind::Action => "action",
            StepKind::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, StepKind::Unrecognized(_))
    }
}

impl From<String> for StepKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analysis" => StepKind::Analysis,
            "action" => StepKind::Action,
            _ => StepKind::Unrecognized(raw),
        }
    }
}

impl From<&str> for StepKind {
    fn from(raw: &str) -> Self {
        StepKind::from(raw.to_string())
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> String {
        match kind {
            StepKind::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome recorded on a step once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Success { result: Value },
    Error { error: String },
}

impl StepResult {
    pub fn success(result: impl Into<Value>) -> Self {
        StepResult::Success {
            result: result.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StepResult::Error {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. })
    }

    /// Text form of the result, used when feeding it to later steps.
    pub fn as_text(&self) -> String {
        match self {
            StepResult::Success {
                result: Value::String(text),
            } => text.clone(),
            StepResult::Success { result } => result.to_string(),
            StepResult::Error { error } => error.clone(),
        }
    }
}

/// Outcome of the most recent `execute_task` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        task_id: String,
        message: String,
    },
    Error {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        error: String,
    },
}

impl ExecutionOutcome {
    pub fn completed(task_id: impl Into<String>) -> Self {
        ExecutionOutcome::Success {
            task_id: task_id.into(),
            message: "Task completed successfully".to_string(),
        }
    }

    pub fn step_failed(
        task_id: impl Into<String>,
        step_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        ExecutionOutcome::Error {
            task_id: task_id.into(),
            step_id: Some(step_id.into()),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}

/// One unit of model-assisted work within a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// `step_<n>`, 1-based in planning order
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// Build a freshly planned step at 1-based position `position`.
    pub fn planned(
        position: usize,
        description: impl Into<String>,
        kind: StepKind,
        parameters: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("step_{}", position),
            description: description.into(),
            kind,
            parameters,
            status: StepStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::Running;
        self.result = None;
        self.updated_at = now;
    }

    /// Record a terminal result; the status follows the result variant.
    pub fn finish(&mut self, result: StepResult, now: DateTime<Utc>) {
        self.status = if result.is_success() {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.result = Some(result);
        self.updated_at = now;
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            Some(StepResult::Error { error }) => Some(error),
            _ => None,
        }
    }
}

/// A unit of orchestrated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Set only when the task is moved to history
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionOutcome>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        context: Map<String, Value>,
        steps: Vec<Step>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            context,
            status: TaskStatus::Pending,
            steps,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn step(&self, step_id: &str) -> CoreResult<&Step> {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| CoreError::not_found(format!("step {} in {}", step_id, self.task_id)))
    }

    /// Index of the first step that still needs to run, if any.
    pub fn next_runnable_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.status != StepStatus::Completed)
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary::from(self)
    }
}

/// Compact view of a task for list screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_step: Option<String>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            description: task.description.clone(),
            status: task.status,
            total_steps: task.steps.len(),
            completed_steps: task
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .count(),
            failed_step: task
                .steps
                .iter()
                .find(|s| s.status == StepStatus::Failed)
                .map(|s| s.id.clone()),
            updated_at: task.updated_at,
        }
    }
}
