//! CLI presentation: text and json formatters per command family.

mod dataset;
mod status;

pub use dataset::{format_flags_json, format_flags_text, format_manual_result};
pub use status::{
    format_progress_line, format_run_summary, format_status_json, format_status_text,
};

use crate::dataset::{SectionFlags, SectionKind};
use crate::error::{EngineError, StorageError};

fn section_list(flags: &SectionFlags) -> String {
    let sections: Vec<&str> = SectionKind::ALL
        .iter()
        .filter(|kind| flags.has(**kind))
        .map(|kind| kind.as_str())
        .collect();
    if sections.is_empty() {
        "-".to_string()
    } else {
        sections.join(", ")
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::StorageError(StorageError::Encode(e.to_string())))
}
