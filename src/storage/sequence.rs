//! Task Id Allocation
//!
//! Monotonic `task_<n>` ids backed by a counter persisted next to the task
//! collections. The counter is advanced on disk before an id is handed out, so
//! an id is never reissued even if the process dies right after allocating it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::atomic_json::AtomicJsonFile;
use crate::utils::error::AppResult;

const TASK_ID_PREFIX: &str = "task_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SequenceState {
    next: u64,
}

/// Hands out unique task ids.
#[derive(Debug)]
pub struct TaskIdAllocator {
    file: AtomicJsonFile<SequenceState>,
    next: u64,
}

impl TaskIdAllocator {
    /// Open the counter, never going below `max(existing suffix) + 1`.
    ///
    /// A missing or unreadable sequence file is rebuilt from `existing_ids`.
    pub fn open<'a, I>(path: impl Into<PathBuf>, existing_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let file: AtomicJsonFile<SequenceState> = AtomicJsonFile::new(path);
        let persisted = match file.load() {
            Ok(state) => state.map(|s| s.next).unwrap_or(1),
            Err(e) => {
                tracing::warn!(
                    path = %file.path().display(),
                    error = %e,
                    "task sequence unreadable, rebuilding from stored tasks"
                );
                1
            }
        };

        let floor = existing_ids
            .into_iter()
            .filter_map(parse_task_number)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);

        Self {
            file,
            next: persisted.max(floor),
        }
    }

    /// Reserve the next id and persist the advanced counter.
    pub fn allocate(&mut self) -> AppResult<String> {
        let number = self.next;
        self.file.save(&SequenceState { next: number + 1 })?;
        self.next = number + 1;
        Ok(format!("{}{}", TASK_ID_PREFIX, number))
    }

    /// Value the next `allocate` will use.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Numeric suffix of a `task_<n>` id.
pub fn parse_task_number(task_id: &str) -> Option<u64> {
    task_id.strip_prefix(TASK_ID_PREFIX)?.parse().ok()
}
