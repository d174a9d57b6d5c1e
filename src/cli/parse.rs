//! CLI parse: clap types for finsynth. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// finsynth - resumable batch generation of synthetic customer financial data
#[derive(Parser)]
#[command(name = "finsynth")]
#[command(about = "Resumable, checkpointed batch generation of synthetic customer financial data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a generation run, or continue an interrupted one. Ctrl-C pauses.
    Run {
        /// Period to generate (YYYY-MM). Defaults to the checkpointed or configured period.
        #[arg(long)]
        period: Option<String>,
        /// Regenerate customers that already have stored data
        #[arg(long)]
        overwrite: bool,
    },
    /// Resume a paused run
    Resume {
        #[arg(long)]
        period: Option<String>,
    },
    /// Show run progress and per-customer results
    Status {
        #[arg(long)]
        period: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Stop a paused run and discard its checkpoint
    Stop {
        #[arg(long)]
        period: Option<String>,
    },
    /// Discard any checkpoint and rebuild statuses from stored data
    Reset {
        /// Switch to this period while resetting
        #[arg(long)]
        period: Option<String>,
    },
    /// Show which sections a customer is generated with
    Flags {
        customer_id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate a single customer outside the queue, then optionally save it
    GenerateOne {
        customer_id: String,
        #[arg(long)]
        period: Option<String>,
        /// Save without asking
        #[arg(long)]
        yes: bool,
    },
}
