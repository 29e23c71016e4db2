//! Task Store
//!
//! File-backed persistence for the two task collections: active tasks and the
//! archived history. Each collection is one JSON array rewritten in full on
//! every mutation through `AtomicJsonFile`.
//!
//! Loading never fails on bad data. A missing file is created empty; a file
//! that cannot be parsed is renamed to `<name>.bak` and replaced by an empty
//! collection. Saving, on the other hand, always reports failure to the caller.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use opsdesk_core::{ExecutionOutcome, StepResult, StepStatus, Task, TaskStatus};

use crate::storage::atomic_json::AtomicJsonFile;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_dir, ACTIVE_TASKS_FILE, TASK_HISTORY_FILE};

/// Error recorded on work that was running when the process stopped.
pub const INTERRUPTED_ERROR: &str = "interrupted before completion";

/// The two persisted task collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Active,
    History,
}

impl Collection {
    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Active => ACTIVE_TASKS_FILE,
            Collection::History => TASK_HISTORY_FILE,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collection::Active => write!(f, "active"),
            Collection::History => write!(f, "history"),
        }
    }
}

/// In-memory working copy of both collections plus their backing files.
#[derive(Debug)]
pub struct TaskStore {
    data_dir: PathBuf,
    active: Vec<Task>,
    history: Vec<Task>,
}

impl TaskStore {
    /// Open the store in `data_dir`, loading (and if needed repairing) both files.
    pub fn open(data_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let data_dir = data_dir.into();
        ensure_dir(&data_dir)?;

        let mut store = Self {
            data_dir,
            active: Vec::new(),
            history: Vec::new(),
        };
        store.history = store.load(Collection::History);
        store.active = store.load(Collection::Active);
        store.reconcile();

        tracing::info!(
            data_dir = %store.data_dir.display(),
            active = store.active.len(),
            history = store.history.len(),
            "task store opened"
        );
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.file_name())
    }

    fn file(&self, collection: Collection) -> AtomicJsonFile<Vec<Task>> {
        AtomicJsonFile::new(self.path(collection))
    }

    /// Read a collection from disk. Never returns an error: missing files are
    /// created empty and unparsable files are quarantined.
    pub fn load(&self, collection: Collection) -> Vec<Task> {
        let file = self.file(collection);
        match file.load() {
            Ok(Some(tasks)) => {
                tracing::debug!(%collection, count = tasks.len(), "collection loaded");
                tasks
            }
            Ok(None) => {
                if !file.path().exists() {
                    if let Err(e) = file.save(&Vec::new()) {
                        tracing::warn!(
                            %collection,
                            path = %file.path().display(),
                            error = %e,
                            "could not create empty collection file"
                        );
                    }
                }
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(
                    %collection,
                    path = %file.path().display(),
                    error = %e,
                    "collection file is corrupt, quarantining"
                );
                self.quarantine(&file);
                Vec::new()
            }
        }
    }

    /// Move a corrupt file aside and start the collection over empty.
    fn quarantine(&self, file: &AtomicJsonFile<Vec<Task>>) {
        let backup = backup_path(file.path());
        if let Err(e) = fs::rename(file.path(), &backup) {
            // Keep the original bytes in place rather than overwrite them.
            tracing::error!(
                path = %file.path().display(),
                error = %e,
                "could not quarantine corrupt collection file"
            );
            return;
        }
        tracing::warn!(backup = %backup.display(), "corrupt collection moved aside");

        if let Err(e) = file.save(&Vec::new()) {
            tracing::error!(
                path = %file.path().display(),
                error = %e,
                "could not recreate collection file after quarantine"
            );
        }
    }

    /// Drop active copies of tasks that also appear in history.
    ///
    /// A crash between the two writes of `move_task` leaves the task in both
    /// files; history is written first, so its copy is authoritative.
    fn reconcile(&mut self) {
        let archived: HashSet<&str> = self.history.iter().map(|t| t.task_id.as_str()).collect();
        let before = self.active.len();
        self.active.retain(|t| !archived.contains(t.task_id.as_str()));

        let dropped = before - self.active.len();
        if dropped > 0 {
            tracing::warn!(dropped, "removed active tasks already present in history");
            if let Err(e) = self.save(Collection::Active) {
                tracing::warn!(error = %e, "could not rewrite active tasks after reconcile");
            }
        }
    }

    /// Write the in-memory collection to disk, replacing the file in full.
    pub fn save(&self, collection: Collection) -> AppResult<()> {
        self.file(collection).save(self.collection(collection))
    }

    fn collection(&self, collection: Collection) -> &Vec<Task> {
        match collection {
            Collection::Active => &self.active,
            Collection::History => &self.history,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Task> {
        match collection {
            Collection::Active => &mut self.active,
            Collection::History => &mut self.history,
        }
    }

    pub fn tasks(&self, collection: Collection) -> &[Task] {
        self.collection(collection)
    }

    pub fn find(&self, collection: Collection, task_id: &str) -> Option<&Task> {
        self.collection(collection)
            .iter()
            .find(|t| t.task_id == task_id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.active
            .iter()
            .chain(self.history.iter())
            .map(|t| t.task_id.as_str())
    }

    /// Append a new task and persist. The task is not kept if the write fails.
    pub fn insert(&mut self, collection: Collection, task: Task) -> AppResult<()> {
        if self.find(Collection::Active, &task.task_id).is_some()
            || self.find(Collection::History, &task.task_id).is_some()
        {
            return Err(AppError::conflict(format!(
                "Task {} already exists",
                task.task_id
            )));
        }

        self.collection_mut(collection).push(task);
        if let Err(e) = self.save(collection) {
            self.collection_mut(collection).pop();
            return Err(e);
        }
        Ok(())
    }

    /// Replace the stored copy of `task` (matched by id) and persist.
    pub fn replace(&mut self, collection: Collection, task: Task) -> AppResult<()> {
        let slot = self
            .collection_mut(collection)
            .iter_mut()
            .find(|t| t.task_id == task.task_id)
            .ok_or_else(|| {
                AppError::not_found(format!("Task {} in {} tasks", task.task_id, collection))
            })?;
        *slot = task;
        self.save(collection)
    }

    /// Move a task between collections, stamping `completed_at`/`updated_at`.
    ///
    /// Returns `Ok(None)` when the task is not in `from`. The destination is
    /// written before the source; if the destination write fails the move is
    /// undone in memory.
    pub fn move_task(
        &mut self,
        task_id: &str,
        from: Collection,
        to: Collection,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Task>> {
        let Some(index) = self
            .collection(from)
            .iter()
            .position(|t| t.task_id == task_id)
        else {
            return Ok(None);
        };

        let original = self.collection_mut(from).remove(index);
        let mut moved = original.clone();
        moved.completed_at = Some(now);
        moved.updated_at = now;
        self.collection_mut(to).push(moved.clone());

        if let Err(e) = self.save(to) {
            self.collection_mut(to).pop();
            self.collection_mut(from).insert(index, original);
            return Err(e);
        }
        self.save(from)?;

        tracing::info!(task_id, %from, %to, "task moved");
        Ok(Some(moved))
    }

    /// Fail tasks and steps left `running` by a previous process.
    ///
    /// Returns how many tasks were repaired.
    pub fn recover_interrupted(&mut self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut repaired = 0;
        for task in self.active.iter_mut() {
            let running_step = task
                .steps
                .iter()
                .position(|s| s.status == StepStatus::Running);
            if task.status != TaskStatus::Running && running_step.is_none() {
                continue;
            }

            let mut failed_step = None;
            if let Some(index) = running_step {
                let step = &mut task.steps[index];
                step.finish(StepResult::error(INTERRUPTED_ERROR), now);
                failed_step = Some(step.id.clone());
            }

            task.status = TaskStatus::Failed;
            task.result = Some(ExecutionOutcome::Error {
                task_id: task.task_id.clone(),
                step_id: failed_step,
                error: INTERRUPTED_ERROR.to_string(),
            });
            task.touch(now);
            repaired += 1;

            tracing::warn!(task_id = %task.task_id, "marked interrupted task as failed");
        }

        if repaired > 0 {
            self.save(Collection::Active)?;
        }
        Ok(repaired)
    }
}

/// `<file>.bak`, or `<file>.bak.<unix-seconds>` when a backup already exists.
fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection.json".to_string());

    let first = path.with_file_name(format!("{}.bak", name));
    if !first.exists() {
        return first;
    }
    path.with_file_name(format!("{}.bak.{}", name, Utc::now().timestamp()))
}
