//! Configuration System
//!
//! Layered configuration for the generation engine: built-in defaults, a global file, workspace
//! files and `FINSYNTH__` environment variables, merged by the `config` crate and validated
//! as a whole before use.

use crate::engine::EngineSettings;
use crate::error::EngineError;
use crate::generation::GenerationConfig;
use crate::logging::LoggingConfig;
use crate::types::Period;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::environment::{ENV_PREFIX, ENV_SEPARATOR};
pub use sources::workspace_file::ENV_NAME_VAR;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinsynthConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[engine]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between consecutive customers, in milliseconds.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Period to select at launch (`YYYY-MM`). Defaults to the current month.
    #[serde(default)]
    pub period: Option<String>,

    #[serde(default)]
    pub overwrite_existing: bool,
}

fn default_item_delay_ms() -> u64 {
    2000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: default_item_delay_ms(),
            period: None,
            overwrite_existing: false,
        }
    }
}

impl EngineConfig {
    pub fn resolve_period(&self) -> Result<Period, EngineError> {
        match self.period.as_deref() {
            Some(period) => period.parse(),
            None => Ok(Period::current()),
        }
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

/// Where checkpoints are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// A tree inside the dataset store database.
    #[default]
    Sled,
    /// A standalone JSON file.
    File,
}

/// `[storage]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub checkpoint_backend: CheckpointBackend,

    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".finsynth/store")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".finsynth/checkpoint.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            checkpoint_backend: CheckpointBackend::default(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_store_path(&self, workspace_root: &Path) -> PathBuf {
        resolve_path(workspace_root, &self.store_path)
    }

    pub fn resolved_checkpoint_path(&self, workspace_root: &Path) -> PathBuf {
        resolve_path(workspace_root, &self.checkpoint_path)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.store_path.as_os_str().is_empty() {
            return Err("store_path cannot be empty".to_string());
        }
        if self.checkpoint_backend == CheckpointBackend::File
            && self.checkpoint_path.as_os_str().is_empty()
        {
            return Err("checkpoint_path cannot be empty with the file backend".to_string());
        }
        Ok(())
    }
}

/// `[directory]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// JSON file holding the customer list.
    #[serde(default = "default_directory_path")]
    pub path: PathBuf,
}

fn default_directory_path() -> PathBuf {
    PathBuf::from("customers.json")
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: default_directory_path(),
        }
    }
}

impl DirectoryConfig {
    pub fn resolved_path(&self, workspace_root: &Path) -> PathBuf {
        resolve_path(workspace_root, &self.path)
    }
}

fn resolve_path(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Engine(String),
    Generation(String),
    Storage(String),
    Directory(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "engine: {}", msg),
            ValidationError::Generation(msg) => write!(f, "generation: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
            ValidationError::Directory(msg) => write!(f, "directory: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl FinsynthConfig {
    /// Validate the entire configuration, collecting every problem.
    ///
    /// The generation section is only checked once an endpoint is configured, so commands
    /// that never call the generator work without one.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.resolve_period() {
            errors.push(ValidationError::Engine(e.to_string()));
        }
        if self.generation.endpoint.is_some() {
            if let Err(e) = self.generation.validate() {
                errors.push(ValidationError::Generation(e));
            }
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if self.directory.path.as_os_str().is_empty() {
            errors.push(ValidationError::Directory("path cannot be empty".to_string()));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validation as a single engine error, one problem per line.
    pub fn ensure_valid(&self) -> Result<(), EngineError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Engine settings, with an optional period override taking precedence over config.
    pub fn engine_settings(&self, period: Option<Period>) -> Result<EngineSettings, EngineError> {
        let period = match period {
            Some(period) => period,
            None => self.engine.resolve_period()?,
        };
        Ok(EngineSettings::new(period)
            .with_item_delay(self.engine.item_delay())
            .with_overwrite(self.engine.overwrite_existing))
    }
}
