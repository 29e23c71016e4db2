//! Shared test doubles and fixtures.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use opsdesk::services::orchestration::{
    StepExecutionConfig, StepExecutor, StepPlanner, TaskOrchestrator,
};
use opsdesk::storage::TaskStore;
use opsdesk_llm::{CompletionClient, LlmError, LlmResult};

/// Replays a fixed script of replies and records every prompt it sees.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(replies: Vec<LlmResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Other {
                    message: "script exhausted".to_string(),
                })
            })
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Never answers.
pub struct PendingClient;

#[async_trait]
impl CompletionClient for PendingClient {
    async fn complete(&self, _prompt: &str, _system_prompt: Option<&str>) -> LlmResult<String> {
        std::future::pending().await
    }
}

/// Answers the first call (planning) with a one-step analysis plan, then
/// blocks every later call until released.
pub struct GatedClient {
    planned: AtomicUsize,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            planned: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl CompletionClient for GatedClient {
    async fn complete(&self, _prompt: &str, _system_prompt: Option<&str>) -> LlmResult<String> {
        if self.planned.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(plan(&["analysis"]));
        }
        self.entered.notify_one();
        self.release.notified().await;
        Ok("released".to_string())
    }
}

/// Plans one analysis step, then breaks the active task file while that step
/// is "running" so every later store write fails.
pub struct StoreBreakingClient {
    data_dir: PathBuf,
    calls: AtomicUsize,
}

impl StoreBreakingClient {
    pub fn new(data_dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            data_dir: data_dir.to_path_buf(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionClient for StoreBreakingClient {
    async fn complete(&self, _prompt: &str, _system_prompt: Option<&str>) -> LlmResult<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(plan(&["analysis"]));
        }
        block_active_file(&self.data_dir);
        Ok("disk usage at 40%".to_string())
    }
}

/// Swap `active_tasks.json` for a non-empty directory so the atomic rename
/// onto it fails.
pub fn block_active_file(data_dir: &Path) {
    let active = data_dir.join("active_tasks.json");
    if active.is_file() {
        std::fs::remove_file(&active).unwrap();
    }
    std::fs::create_dir_all(&active).unwrap();
    std::fs::write(active.join("blocker"), "x").unwrap();
}

pub fn ok(text: impl Into<String>) -> LlmResult<String> {
    Ok(text.into())
}

pub fn network_error(message: &str) -> LlmResult<String> {
    Err(LlmError::NetworkError {
        message: message.to_string(),
    })
}

/// Planner reply with one step per kind, in order.
pub fn plan(kinds: &[&str]) -> String {
    let steps: Vec<serde_json::Value> = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            serde_json::json!({
                "id": format!("step_{}", i + 1),
                "description": format!("{} step {}", kind, i + 1),
                "type": kind,
                "parameters": {}
            })
        })
        .collect();
    serde_json::Value::Array(steps).to_string()
}

pub fn orchestrator(data_dir: &Path, client: Arc<dyn CompletionClient>) -> TaskOrchestrator {
    TaskOrchestrator::open(
        TaskStore::open(data_dir).unwrap(),
        StepPlanner::new(client.clone()),
        StepExecutor::new(client, StepExecutionConfig::default()),
    )
    .unwrap()
}
