//! Atomic JSON File
//!
//! Whole-document JSON persistence with crash-safe replacement: data is written
//! to a sibling temp file, fsynced, then renamed over the target. A reader
//! never observes a half-written document.

use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Handle to a JSON document replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct AtomicJsonFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicJsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the document.
    ///
    /// - `Ok(Some(T))`: loaded
    /// - `Ok(None)`: file missing or blank
    /// - `Err`: unreadable or not valid JSON for `T`
    pub fn load(&self) -> AppResult<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let data: T = serde_json::from_str(&content)?;
        Ok(Some(data))
    }

    /// Serializes `data` (pretty-printed) and atomically replaces the file.
    pub fn save(&self, data: &T) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(data)?;

        let tmp_path = self.temp_path()?;
        let written = Self::write_synced(&tmp_path, json.as_bytes())
            .and_then(|_| fs::rename(&tmp_path, &self.path).map_err(AppError::from));

        if written.is_err() {
            // Leave no stray temp files behind; the original is untouched.
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    fn write_synced(path: &Path, bytes: &[u8]) -> AppResult<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Temp file in the same directory so the rename stays on one filesystem.
    fn temp_path(&self) -> AppResult<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| AppError::internal(format!("{} has no file name", self.path.display())))?
            .to_string_lossy();

        let tmp_name = format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple());
        Ok(match self.path.parent() {
            Some(parent) => parent.join(tmp_name),
            None => PathBuf::from(tmp_name),
        })
    }
}
