//! Error types for the finsynth batch generation engine.

use crate::engine::RunState;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to encode record: {0}")]
    Encode(String),

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Engine-wide errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Customer directory is empty; nothing to generate")]
    EmptyDirectory,

    #[error("Cannot {command} while the engine is {state}")]
    InvalidTransition {
        command: &'static str,
        state: RunState,
    },

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("No manual generation result is waiting to be saved")]
    NoManualResult,

    #[error("Manual result for {0} has no dataset to save")]
    NothingToSave(String),

    #[error("Invalid period '{0}' (expected YYYY-MM)")]
    InvalidPeriod(String),

    #[error("Directory error: {0}")]
    DirectoryError(String),

    #[error("Generation request failed: {0}")]
    GenerationRequestFailed(String),

    #[error("Generation service rate limit exceeded: {0}")]
    GenerationRateLimited(String),

    #[error("Generation service authentication failed: {0}")]
    GenerationAuthFailed(String),

    #[error("Generation service timed out: {0}")]
    GenerationTimeout(String),

    #[error("Malformed generation response: {0}")]
    GenerationMalformed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine worker has shut down")]
    EngineShutDown,
}

impl EngineError {
    /// True for errors raised by the generation service call.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            EngineError::GenerationRequestFailed(_)
                | EngineError::GenerationRateLimited(_)
                | EngineError::GenerationAuthFailed(_)
                | EngineError::GenerationTimeout(_)
                | EngineError::GenerationMalformed(_)
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
