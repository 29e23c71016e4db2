//! Task Orchestrator
//!
//! Owns the task lifecycle: planning new tasks, running their steps in order,
//! recording every transition in the task store, and moving finished work into
//! history.
//!
//! ```text
//! pending -> running -> completed  (moved to history)
//!                    -> failed     (stays active, re-runnable)
//! ```
//!
//! Model calls are the only suspension points. The store lock is never held
//! across one, so reads stay responsive while a step is in flight.

use chrono::Utc;
use dashmap::DashSet;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use opsdesk_core::{ExecutionOutcome, StepResult, StepStatus, Task, TaskStatus, TaskSummary};

use super::planner::StepPlanner;
use super::step_executor::StepExecutor;
use crate::storage::sequence::TaskIdAllocator;
use crate::storage::task_store::{Collection, TaskStore};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::TASK_SEQUENCE_FILE;

/// Error recorded on a step whose model call was cancelled.
pub const CANCELLED_ERROR: &str = "cancelled";

pub struct TaskOrchestrator {
    store: Mutex<TaskStore>,
    ids: Mutex<TaskIdAllocator>,
    planner: StepPlanner,
    executor: StepExecutor,
    executing: DashSet<String>,
}

/// Marks a task id as executing for as long as it is alive.
struct ExecutionGuard<'a> {
    executing: &'a DashSet<String>,
    task_id: String,
}

impl<'a> ExecutionGuard<'a> {
    fn claim(executing: &'a DashSet<String>, task_id: &str) -> Option<Self> {
        if !executing.insert(task_id.to_string()) {
            return None;
        }
        Some(Self {
            executing,
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.executing.remove(&self.task_id);
    }
}

impl TaskOrchestrator {
    /// Build an orchestrator over an opened store.
    ///
    /// Tasks left `running` by a previous process are failed first.
    pub fn open(
        mut store: TaskStore,
        planner: StepPlanner,
        executor: StepExecutor,
    ) -> AppResult<Self> {
        let repaired = store.recover_interrupted(Utc::now())?;
        if repaired > 0 {
            tracing::warn!(repaired, "recovered tasks interrupted by a previous run");
        }

        let ids = TaskIdAllocator::open(
            store.data_dir().join(TASK_SEQUENCE_FILE),
            store.task_ids(),
        );

        Ok(Self {
            store: Mutex::new(store),
            ids: Mutex::new(ids),
            planner,
            executor,
            executing: DashSet::new(),
        })
    }

    pub async fn create_task(
        &self,
        description: &str,
        context: Map<String, Value>,
    ) -> AppResult<Task> {
        self.create_task_with_cancel(description, context, &CancellationToken::new())
            .await
    }

    /// Plan and store a new task.
    ///
    /// Nothing is stored if `cancel` fires before planning finishes.
    pub async fn create_task_with_cancel(
        &self,
        description: &str,
        context: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> AppResult<Task> {
        let task_id = self.ids.lock().await.allocate()?;
        tracing::info!(task_id = %task_id, "planning task");

        let steps = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(task_id = %task_id, "task creation cancelled during planning");
                return Err(AppError::cancelled(format!("Creation of {} was cancelled", task_id)));
            }
            planned = self.planner.plan(description, &context) => planned,
        };

        let task = Task::new(task_id, description, context, steps, Utc::now());
        self.store
            .lock()
            .await
            .insert(Collection::Active, task.clone())?;

        tracing::info!(
            task_id = %task.task_id,
            steps = task.steps.len(),
            "task created"
        );
        Ok(task)
    }

    /// Snapshot of the active collection.
    pub async fn get_active_tasks(&self) -> Vec<Task> {
        self.store.lock().await.tasks(Collection::Active).to_vec()
    }

    /// Snapshot of the history collection.
    pub async fn get_task_history(&self) -> Vec<Task> {
        self.store.lock().await.tasks(Collection::History).to_vec()
    }

    /// Look a task up in active, then history. `None` is a normal outcome.
    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        let store = self.store.lock().await;
        store
            .find(Collection::Active, task_id)
            .or_else(|| store.find(Collection::History, task_id))
            .cloned()
    }

    pub async fn list_task_summaries(&self) -> Vec<TaskSummary> {
        self.store
            .lock()
            .await
            .tasks(Collection::Active)
            .iter()
            .map(TaskSummary::from)
            .collect()
    }

    /// `(active, history)` collection sizes.
    pub async fn task_counts(&self) -> (usize, usize) {
        let store = self.store.lock().await;
        (
            store.tasks(Collection::Active).len(),
            store.tasks(Collection::History).len(),
        )
    }

    pub fn is_executing(&self, task_id: &str) -> bool {
        self.executing.contains(task_id)
    }

    /// Move an active task to history.
    ///
    /// Unknown or already archived ids are a logged no-op returning `None`.
    pub async fn archive_task(&self, task_id: &str) -> AppResult<Option<Task>> {
        // Executions claim their id before taking this lock, so the check
        // must happen under it.
        let mut store = self.store.lock().await;
        if self.is_executing(task_id) {
            return Err(AppError::conflict(format!(
                "Task {} is executing and cannot be archived",
                task_id
            )));
        }

        let archived =
            store.move_task(task_id, Collection::Active, Collection::History, Utc::now())?;

        match &archived {
            Some(_) => tracing::info!(task_id, "task archived"),
            None => tracing::warn!(task_id, "archive requested for a task that is not active"),
        }
        Ok(archived)
    }

    pub async fn execute_task(&self, task_id: &str) -> AppResult<ExecutionOutcome> {
        self.execute_task_with_cancel(task_id, &CancellationToken::new())
            .await
    }

    /// Run a task's remaining steps in order.
    ///
    /// Step failures are reported in the returned outcome, not as `Err`. `Err`
    /// means the task could not be run at all (unknown, archived, already
    /// executing) or a store write failed. After a failed write the task is
    /// still left `failed` in memory, never `running`.
    pub async fn execute_task_with_cancel(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ExecutionOutcome> {
        let _guard = ExecutionGuard::claim(&self.executing, task_id).ok_or_else(|| {
            AppError::conflict(format!("Task {} is already executing", task_id))
        })?;

        let mut task = self.start_execution(task_id).await?;
        match self.run_steps(&mut task, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.abandon(&mut task, &e).await;
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
    ) -> AppResult<ExecutionOutcome> {
        let task_id = task.task_id.clone();
        let first = task.next_runnable_step().unwrap_or(task.steps.len());
        tracing::info!(
            task_id = %task_id,
            steps = task.steps.len(),
            starting_at = first,
            "executing task"
        );

        for index in first..task.steps.len() {
            if task.steps[index].status == StepStatus::Completed {
                continue;
            }

            let now = Utc::now();
            task.steps[index].mark_running(now);
            task.touch(now);
            self.persist(task).await?;

            let step = task.steps[index].clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(task_id = %task_id, step_id = %step.id, "step cancelled");
                    StepResult::error(CANCELLED_ERROR)
                }
                result = self.executor.execute(&step, &*task) => result,
            };

            let now = Utc::now();
            task.steps[index].finish(result, now);
            task.touch(now);

            if let Some(error) = task.steps[index].error_message().map(str::to_string) {
                let outcome = ExecutionOutcome::step_failed(&task_id, &step.id, error);
                task.status = TaskStatus::Failed;
                task.result = Some(outcome.clone());
                self.persist(task).await?;

                tracing::error!(task_id = %task_id, step_id = %step.id, "task failed");
                return Ok(outcome);
            }

            self.persist(task).await?;
        }

        let outcome = ExecutionOutcome::completed(&task_id);
        task.status = TaskStatus::Completed;
        task.result = Some(outcome.clone());
        task.touch(Utc::now());

        let mut store = self.store.lock().await;
        store.replace(Collection::Active, task.clone())?;
        store.move_task(&task_id, Collection::Active, Collection::History, Utc::now())?;

        tracing::info!(task_id = %task_id, "task completed and archived");
        Ok(outcome)
    }

    /// Look the task up and persist it as `running`.
    ///
    /// If that write fails the in-memory copy is put back as it was.
    async fn start_execution(&self, task_id: &str) -> AppResult<Task> {
        let mut store = self.store.lock().await;

        let Some(existing) = store.find(Collection::Active, task_id) else {
            if store.find(Collection::History, task_id).is_some() {
                return Err(AppError::conflict(format!(
                    "Task {} is already archived",
                    task_id
                )));
            }
            return Err(AppError::not_found(format!("Task {}", task_id)));
        };

        let previous = existing.clone();
        let mut task = previous.clone();
        task.status = TaskStatus::Running;
        task.result = None;
        task.touch(Utc::now());

        if let Err(e) = store.replace(Collection::Active, task.clone()) {
            tracing::error!(task_id, error = %e, "could not record task start");
            if let Err(restore) = store.replace(Collection::Active, previous) {
                tracing::warn!(task_id, error = %restore, "previous task state not rewritten");
            }
            return Err(e);
        }
        Ok(task)
    }

    /// Fail a task whose execution stopped on a store error.
    ///
    /// Steps caught mid-run and the task itself become `failed` so readers
    /// never see `running` work that nothing is executing. The final write is
    /// best effort; the in-memory copy is updated either way.
    async fn abandon(&self, task: &mut Task, error: &AppError) {
        if matches!(task.status, TaskStatus::Failed | TaskStatus::Completed) {
            // The terminal state already reached memory; only its write failed.
            return;
        }

        let message = format!("task state could not be saved: {}", error);
        let now = Utc::now();
        let mut failed_step = None;
        for step in task.steps.iter_mut().filter(|s| s.status == StepStatus::Running) {
            step.finish(StepResult::error(message.clone()), now);
            failed_step = Some(step.id.clone());
        }

        task.status = TaskStatus::Failed;
        task.result = Some(ExecutionOutcome::Error {
            task_id: task.task_id.clone(),
            step_id: failed_step,
            error: message,
        });
        task.touch(now);

        if let Err(e) = self
            .store
            .lock()
            .await
            .replace(Collection::Active, task.clone())
        {
            tracing::error!(task_id = %task.task_id, error = %e, "failed task state not persisted");
        }
    }

    async fn persist(&self, task: &Task) -> AppResult<()> {
        self.store
            .lock()
            .await
            .replace(Collection::Active, task.clone())
    }
}
