//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::EngineError;

/// Map domain errors to a string for CLI output, with a hint where one helps.
pub fn map_error(e: &EngineError) -> String {
    match e {
        EngineError::EmptyDirectory => {
            format!("{}\nHint: check the [directory] path in your configuration.", e)
        }
        EngineError::GenerationAuthFailed(_) => {
            format!("{}\nHint: set generation.api_key or generation.api_key_env.", e)
        }
        _ => e.to_string(),
    }
}
