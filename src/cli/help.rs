//! CLI command-name contract for logging and routing.

use crate::cli::parse::Commands;

/// Command name used in log fields (e.g. "run", "generate_one").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Run { .. } => "run",
        Commands::Resume { .. } => "resume",
        Commands::Status { .. } => "status",
        Commands::Stop { .. } => "stop",
        Commands::Reset { .. } => "reset",
        Commands::Flags { .. } => "flags",
        Commands::GenerateOne { .. } => "generate_one",
    }
}

/// Whether the command calls the generation service.
pub fn needs_generator(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Run { .. } | Commands::Resume { .. } | Commands::GenerateOne { .. }
    )
}
