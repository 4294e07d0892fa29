//! File system paths for the campaign services.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths (config, logs, local broadcast store).
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.campaign)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.campaign`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".campaign"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.campaign).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.campaign/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.campaign/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central JSONL log file (~/.campaign/logs/dev.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    /// Directory of JSON broadcast records used by the local scheduler
    /// (~/.campaign/broadcasts).
    pub fn broadcasts_dir(&self) -> PathBuf {
        self.base_dir.join("broadcasts")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.broadcasts_dir())?;
        Ok(())
    }
}
