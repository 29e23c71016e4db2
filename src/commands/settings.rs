//! Settings Commands
//!
//! Commands for reading and updating application settings.

use crate::models::response::CommandResponse;
use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::state::AppState;

const REDACTED: &str = "********";

/// Get current application settings, with secrets redacted
pub async fn get_settings(state: &AppState) -> CommandResponse<AppConfig> {
    match state.get_config().await {
        Ok(config) => CommandResponse::ok(redact(config)),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Update application settings with a partial update
pub async fn update_settings(update: SettingsUpdate, state: &AppState) -> CommandResponse<AppConfig> {
    if update.is_empty() {
        return get_settings(state).await;
    }

    match state.update_config(update).await {
        Ok(config) => {
            tracing::info!("settings updated");
            CommandResponse::ok(redact(config))
        }
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

fn redact(mut config: AppConfig) -> AppConfig {
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(REDACTED.to_string());
    }
    config
}
