//! Response Types
//!
//! Standard response envelope for every UI-facing command.

use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// Generic command response; failures carry the error text verbatim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> CommandResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response with message
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl<T> From<Result<T, AppError>> for CommandResponse<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub config: bool,
    pub task_store: bool,
    pub data_dir: Option<String>,
    pub completion_client: Option<String>,
    pub active_tasks: usize,
    pub archived_tasks: usize,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: "opsdesk".to_string(),
            config: false,
            task_store: false,
            data_dir: None,
            completion_client: None,
            active_tasks: 0,
            archived_tasks: 0,
        }
    }
}
