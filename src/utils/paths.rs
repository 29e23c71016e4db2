//! Cross-Platform Path Utilities
//!
//! Resolves the OpsDesk data directory (~/.opsdesk/) and the files inside it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Environment variable that relocates the whole data directory
pub const DATA_DIR_ENV: &str = "OPSDESK_DATA_DIR";

pub const CONFIG_FILE: &str = "config.json";
pub const ACTIVE_TASKS_FILE: &str = "active_tasks.json";
pub const TASK_HISTORY_FILE: &str = "task_history.json";
pub const TASK_SEQUENCE_FILE: &str = "task_sequence.json";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the default OpsDesk directory (~/.opsdesk/)
pub fn opsdesk_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".opsdesk"))
}

/// Resolve the data directory: explicit override, then `OPSDESK_DATA_DIR`, then ~/.opsdesk/
pub fn resolve_data_dir(override_dir: Option<&Path>) -> AppResult<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
        _ => opsdesk_dir(),
    }
}

/// Get the config file path inside a data directory
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
