//! Run status: progress lines, status tables and run summaries.

use super::{section_list, to_json};
use crate::engine::{CustomerResult, CustomerStatus, EngineStatus, RunState};
use crate::error::EngineError;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

fn status_badge(status: CustomerStatus) -> String {
    let label = status.as_str();
    match status {
        CustomerStatus::Success => format!("{}", label.green()),
        CustomerStatus::PartialSuccess => format!("{}", label.yellow()),
        CustomerStatus::Error => format!("{}", label.red()),
        CustomerStatus::Processing => format!("{}", label.cyan()),
        CustomerStatus::Existing | CustomerStatus::Skipped => format!("{}", label.dimmed()),
        CustomerStatus::Pending => label.to_string(),
    }
}

fn state_badge(state: RunState) -> String {
    let label = state.as_str();
    match state {
        RunState::Running | RunState::Completed => format!("{}", label.green().bold()),
        RunState::Paused | RunState::Pausing => format!("{}", label.yellow().bold()),
        RunState::Stopped | RunState::Stopping => format!("{}", label.red().bold()),
        RunState::Idle => format!("{}", label.bold()),
    }
}

fn result_detail(result: &CustomerResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    if !result.persistence_failures.is_empty() {
        let failed: Vec<&str> = result
            .persistence_failures
            .iter()
            .map(|failure| failure.section.as_str())
            .collect();
        return format!("not stored: {}", failed.join(", "));
    }
    String::new()
}

/// One line per finished customer while a run is supervised.
pub fn format_progress_line(position: usize, total: usize, result: &CustomerResult) -> String {
    let mut line = format!(
        "[{}/{}] {} {}",
        position,
        total,
        result.customer_id,
        status_badge(result.status)
    );
    let detail = result_detail(result);
    if !detail.is_empty() {
        line.push_str(&format!(" ({})", detail));
    }
    line
}

pub fn format_status_text(status: &EngineStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "Generation status".bold().underline()));
    out.push_str(&format!("  Period:     {}\n", status.period));
    out.push_str(&format!("  State:      {}\n", state_badge(status.state)));
    out.push_str(&format!(
        "  Progress:   {}/{} ({:.0}%)\n",
        status.current_index.min(status.total),
        status.total,
        status.progress_ratio() * 100.0
    ));
    out.push_str(&format!(
        "  Overwrite:  {}\n",
        if status.overwrite_existing { "yes" } else { "no" }
    ));
    if status.restored {
        out.push_str("  Restored from checkpoint\n");
    }
    let counts = &status.counts;
    out.push_str(&format!(
        "  Results:    {} success, {} partial, {} error, {} skipped, {} existing, {} pending\n",
        counts.success,
        counts.partial_success,
        counts.error,
        counts.skipped,
        counts.existing,
        counts.pending
    ));

    if status.results.is_empty() {
        out.push_str("\nNo customers in the directory.");
        return out;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Customer", "Name", "Status", "Stored", "Detail"]);
    for (index, result) in status.results.iter().enumerate() {
        let stored = result
            .existing_sections
            .as_ref()
            .map(section_list)
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            (index + 1).to_string(),
            result.customer_id.to_string(),
            result.customer_name.clone(),
            status_badge(result.status),
            stored,
            result_detail(result),
        ]);
    }
    out.push('\n');
    out.push_str(&table.to_string());
    out
}

pub fn format_status_json(status: &EngineStatus) -> Result<String, EngineError> {
    to_json(status)
}

/// Closing message after a supervised run settles.
pub fn format_run_summary(status: &EngineStatus) -> String {
    let counts = &status.counts;
    let tally = format!(
        "{} success, {} partial, {} error, {} skipped",
        counts.success, counts.partial_success, counts.error, counts.skipped
    );
    match status.state {
        RunState::Completed => format!("Run for {} completed: {}", status.period, tally),
        RunState::Paused => format!(
            "Run for {} paused at {}/{}: {}\nUse `finsynth resume` to continue.",
            status.period,
            status.current_index.min(status.total),
            status.total,
            tally
        ),
        RunState::Stopped => format!("Run for {} stopped: {}", status.period, tally),
        state => format!("Run for {} is {}: {}", status.period, state, tally),
    }
}
