//! Application State
//!
//! Shared state handed to every command: configuration, the task orchestrator,
//! and the cancellation tokens of in-flight work.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use opsdesk_llm::{CompletionClient, OpenAIProvider, ProviderCompletionClient};

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::orchestration::{
    StepExecutionConfig, StepExecutor, StepPlanner, TaskOrchestrator,
};
use crate::storage::{ConfigService, TaskStore};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::resolve_data_dir;

/// Application state shared by commands
pub struct AppState {
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Task lifecycle owner
    orchestrator: Arc<RwLock<Option<Arc<TaskOrchestrator>>>>,
    /// Label of the completion client, for health output
    completion_client: Arc<RwLock<Option<String>>>,
    /// Parent of every per-operation token; cancelled on shutdown
    shutdown: CancellationToken,
    /// Tokens of executions in flight, by task id
    executions: DashMap<String, CancellationToken>,
}

/// Registration of one in-flight execution; unregisters on drop.
pub struct ExecutionScope<'a> {
    executions: &'a DashMap<String, CancellationToken>,
    task_id: String,
    token: CancellationToken,
}

impl ExecutionScope<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.executions.remove(&self.task_id);
    }
}

/// Build the OpenAI-backed completion client described by `config`.
pub fn build_completion_client(config: &AppConfig) -> AppResult<Arc<dyn CompletionClient>> {
    let provider = OpenAIProvider::new(config.provider_config())?;
    let mut client = ProviderCompletionClient::new(Arc::new(provider));
    if let Some(system_prompt) = &config.llm.system_prompt {
        client = client.with_system_prompt(system_prompt.clone());
    }
    Ok(Arc::new(client))
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(None)),
            orchestrator: Arc::new(RwLock::new(None)),
            completion_client: Arc::new(RwLock::new(None)),
            shutdown: CancellationToken::new(),
            executions: DashMap::new(),
        }
    }

    /// Load config from the resolved data directory and start all services
    pub async fn initialize(&self, data_dir: Option<&Path>) -> AppResult<()> {
        let data_dir = resolve_data_dir(data_dir)?;
        let config = ConfigService::load_or_create(&data_dir)?;
        let client = build_completion_client(&config.effective_config())?;
        self.initialize_with(config, client).await
    }

    /// Start services over an already loaded config and a given completion client
    pub async fn initialize_with(
        &self,
        config: ConfigService,
        client: Arc<dyn CompletionClient>,
    ) -> AppResult<()> {
        let effective = config.effective_config();
        let store = TaskStore::open(config.task_data_dir())?;
        let orchestrator = TaskOrchestrator::open(
            store,
            StepPlanner::new(client.clone()),
            StepExecutor::new(
                client.clone(),
                StepExecutionConfig::from(&effective.execution),
            ),
        )?;

        tracing::info!(
            completion_client = %client.describe(),
            config_path = %config.config_path().display(),
            "opsdesk initialized"
        );

        *self.completion_client.write().await = Some(client.describe());
        *self.orchestrator.write().await = Some(Arc::new(orchestrator));
        *self.config.write().await = Some(config);
        Ok(())
    }

    /// The task orchestrator, once initialized
    pub async fn orchestrator(&self) -> AppResult<Arc<TaskOrchestrator>> {
        self.orchestrator
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::config("Task orchestrator not initialized"))
    }

    /// Check if config is healthy
    pub fn is_config_healthy(&self) -> bool {
        if let Ok(guard) = self.config.try_read() {
            if let Some(ref config) = *guard {
                return config.is_healthy();
            }
        }
        false
    }

    pub async fn data_dir(&self) -> Option<PathBuf> {
        self.config
            .read()
            .await
            .as_ref()
            .map(|config| config.task_data_dir())
    }

    pub async fn completion_client_label(&self) -> Option<String> {
        self.completion_client.read().await.clone()
    }

    /// Get the stored configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config().clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration. Completion settings apply on next start.
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => config.update_config(update),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Token for a task creation, cancelled on shutdown
    pub fn creation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Register an execution of `task_id`, or `None` if one is already registered
    pub fn begin_execution(&self, task_id: &str) -> Option<ExecutionScope<'_>> {
        match self.executions.entry(task_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = self.shutdown.child_token();
                slot.insert(token.clone());
                Some(ExecutionScope {
                    executions: &self.executions,
                    task_id: task_id.to_string(),
                    token,
                })
            }
        }
    }

    /// Cancel the in-flight execution of `task_id`. Returns whether one existed.
    pub fn cancel_execution(&self, task_id: &str) -> bool {
        match self.executions.get(task_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(task_id, "execution cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight operation
    pub fn cancel_all(&self) {
        tracing::info!(in_flight = self.executions.len(), "cancelling all operations");
        self.shutdown.cancel();
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
