//! Flags and manual generation results.

use super::{section_list, to_json};
use crate::dataset::SectionKind;
use crate::engine::{CustomerResult, CustomerStatus};
use crate::error::EngineError;
use crate::flags::GenerationFlags;
use crate::types::CustomerId;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_flags_text(customer_id: &CustomerId, bucket: u8, flags: &GenerationFlags) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Section", "Generated"]);
    for kind in SectionKind::ALL {
        let generated = if flags.requests(kind) {
            format!("{}", "yes".green())
        } else {
            format!("{}", "no".dimmed())
        };
        table.add_row(vec![kind.as_str().to_string(), generated]);
    }
    format!("Customer {} (bucket {})\n{}", customer_id, bucket, table)
}

pub fn format_flags_json(
    customer_id: &CustomerId,
    bucket: u8,
    flags: &GenerationFlags,
) -> Result<String, EngineError> {
    to_json(&serde_json::json!({
        "customerId": customer_id,
        "bucket": bucket,
        "flags": flags,
    }))
}

/// Dataset produced by `generate-one`, with its sections and content.
pub fn format_manual_result(result: &CustomerResult) -> Result<String, EngineError> {
    let mut out = format!("Customer {}: {}", result.customer_id, result.status);
    if let Some(error) = &result.error {
        out.push_str(&format!("\n  {} {}", "error:".red(), error));
    }
    if let Some(sections) = &result.existing_sections {
        if result.status != CustomerStatus::Processing {
            out.push_str(&format!("\n  Stored sections: {}", section_list(sections)));
        }
    }
    for failure in &result.persistence_failures {
        out.push_str(&format!(
            "\n  {} {} ({})",
            "not stored:".yellow(),
            failure.section,
            failure.message
        ));
    }
    if let Some(dataset) = &result.dataset {
        let present: Vec<&str> = dataset
            .present_sections()
            .into_iter()
            .map(SectionKind::as_str)
            .collect();
        out.push_str(&format!(
            "\n  Generated sections: {}",
            if present.is_empty() {
                "none".to_string()
            } else {
                present.join(", ")
            }
        ));
        out.push('\n');
        out.push_str(&to_json(dataset)?);
    }
    Ok(out)
}
