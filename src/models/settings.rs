//! Settings Models
//!
//! Application configuration stored in config.json, plus the environment
//! overrides applied on top of it at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use opsdesk_core::ProxyConfig;
use opsdesk_llm::{ProviderConfig, ProviderType};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "OPENAI_MODEL";
pub const LOG_LEVEL_ENV: &str = "OPSDESK_LOG_LEVEL";
pub const PROXY_PASSWORD_ENV: &str = "OPSDESK_PROXY_PASSWORD";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where task files live; defaults to the directory holding config.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Default tracing level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Completion endpoint settings
    #[serde(default)]
    pub llm: LlmSettings,
    /// Outbound proxy for the completion endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// Step execution budgets
    #[serde(default)]
    pub execution: ExecutionSettings,
}

/// Completion endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: ProviderType,
    #[serde(default = "default_model")]
    pub model: String,
    /// Full chat-completions URL for OpenAI-compatible gateways
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Prefer OPENAI_API_KEY over storing the key here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Replaces the built-in IT-support system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// How much earlier-step output is fed into later step prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_max_context_chars_per_step")]
    pub max_context_chars_per_step: usize,
    #[serde(default = "default_max_total_context_chars")]
    pub max_total_context_chars: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_context_chars_per_step() -> usize {
    4000
}

fn default_max_total_context_chars() -> usize {
    16000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: default_log_level(),
            llm: LlmSettings::default(),
            proxy: None,
            execution: ExecutionSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderType::OpenAI,
            model: default_model(),
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_context_chars_per_step: default_max_context_chars_per_step(),
            max_total_context_chars: default_max_total_context_chars(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub log_level: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.base_url.is_none()
            && self.max_tokens.is_none()
            && self.temperature.is_none()
            && self.log_level.is_none()
    }
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(model) = update.model {
            self.llm.model = model;
        }
        if let Some(base_url) = update.base_url {
            // An empty string clears the override
            self.llm.base_url = Some(base_url).filter(|u| !u.trim().is_empty());
        }
        if let Some(max_tokens) = update.max_tokens {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = update.temperature {
            self.llm.temperature = temperature;
        }
        if let Some(level) = update.log_level {
            self.log_level = level;
        }
    }

    /// Overlay environment variables. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(API_KEY_ENV) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = non_empty(MODEL_ENV) {
            self.llm.model = model;
        }
        if let Some(level) = non_empty(LOG_LEVEL_ENV) {
            self.log_level = level.to_lowercase();
        }
        if let Some(password) = non_empty(PROXY_PASSWORD_ENV) {
            if let Some(proxy) = self.proxy.as_mut() {
                proxy.password = Some(password);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level: {}. Must be one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err("llm.model cannot be empty".to_string());
        }

        if self.llm.max_tokens == 0 {
            return Err("llm.max_tokens must be greater than 0".to_string());
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            ));
        }

        if self.execution.max_context_chars_per_step > self.execution.max_total_context_chars {
            return Err(
                "execution.max_context_chars_per_step cannot exceed max_total_context_chars"
                    .to_string(),
            );
        }

        if let Some(proxy) = &self.proxy {
            proxy.validate().map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    /// Provider configuration derived from these settings
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.llm.provider,
            api_key: self.llm.api_key.clone(),
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            proxy: self.proxy.clone(),
        }
    }
}
