//! OpsDesk - Task Orchestration Backend
//!
//! Turns natural-language IT-operations requests into planned, executed and
//! archived tasks. It includes:
//! - Command handlers for the UI layer and CLI
//! - Step planning, step execution and the task lifecycle
//! - File-backed task storage and JSON config
//! - Data models and utilities

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export commonly used items from commands
pub use commands::{
    // Task commands
    archive_task, cancel_execution, create_task, execute_task, get_task, get_task_history,
    list_active_tasks, list_task_summaries,
    // Health commands
    get_health,
    // Settings commands
    get_settings, update_settings,
};
pub use models::response::*;
pub use models::settings::{AppConfig, SettingsUpdate};
pub use services::orchestration::TaskOrchestrator;
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
