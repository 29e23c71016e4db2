//! JSON Configuration Management
//!
//! Handles reading and writing config.json in the data directory.

use std::path::{Path, PathBuf};

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::storage::atomic_json::AtomicJsonFile;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for managing app settings
#[derive(Debug)]
pub struct ConfigService {
    file: AtomicJsonFile<AppConfig>,
    data_dir: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Load config.json from `data_dir`, writing defaults when it is missing
    pub fn load_or_create(data_dir: &Path) -> AppResult<Self> {
        ensure_dir(data_dir)?;

        let file: AtomicJsonFile<AppConfig> = AtomicJsonFile::new(config_path(data_dir));
        let config = match file.load()? {
            Some(config) => {
                config.validate().map_err(AppError::validation)?;
                config
            }
            None => {
                let default_config = AppConfig::default();
                file.save(&default_config)?;
                default_config
            }
        };

        Ok(Self {
            file,
            data_dir: data_dir.to_path_buf(),
            config,
        })
    }

    /// Get the stored configuration (without environment overrides)
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Stored configuration with environment variables applied on top
    pub fn effective_config(&self) -> AppConfig {
        let mut config = self.config.clone();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Directory holding task files: `data_dir` from config, else the config directory
    pub fn task_data_dir(&self) -> PathBuf {
        self.config
            .data_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.clone())
    }

    pub fn config_path(&self) -> &Path {
        self.file.path()
    }

    /// Update the configuration with a partial update
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut next = self.config.clone();
        next.apply_update(update);
        next.validate().map_err(AppError::validation)?;
        self.file.save(&next)?;
        self.config = next;
        Ok(self.config.clone())
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        let config = self
            .file
            .load()?
            .ok_or_else(|| AppError::config("config.json disappeared"))?;
        config.validate().map_err(AppError::validation)?;
        self.config = config;
        Ok(())
    }

    /// Check if the config service is healthy
    pub fn is_healthy(&self) -> bool {
        self.file.path().exists() && self.config.validate().is_ok()
    }
}
