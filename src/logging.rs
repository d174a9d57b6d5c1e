//! Logging System
//!
//! Structured logging using the `tracing` crate. Level, format and destination come from the
//! `[logging]` config section, overridable through `FINSYNTH_LOG*` environment variables and
//! CLI flags.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_FILTER_VAR: &str = "FINSYNTH_LOG";
pub const LOG_FORMAT_VAR: &str = "FINSYNTH_LOG_FORMAT";
pub const LOG_OUTPUT_VAR: &str = "FINSYNTH_LOG_OUTPUT";
pub const LOG_MODULES_VAR: &str = "FINSYNTH_LOG_MODULES";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Disable to install no subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output includes "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format, terminal outputs only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(".finsynth/finsynth.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: true,
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        parse_format(&self.format)?;
        parse_output_destinations(&self.output)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn parse_format(format: &str) -> Result<LogFormat, String> {
    match format {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        )),
    }
}

/// Output destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputDestinations {
    stdout: bool,
    stderr: bool,
    file: bool,
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations, String> {
    let destinations = match output {
        "stdout" => OutputDestinations {
            stdout: true,
            stderr: false,
            file: false,
        },
        "stderr" => OutputDestinations {
            stdout: false,
            stderr: true,
            file: false,
        },
        "file" => OutputDestinations {
            stdout: false,
            stderr: false,
            file: true,
        },
        "file+stderr" | "both" => OutputDestinations {
            stdout: false,
            stderr: true,
            file: true,
        },
        other => {
            return Err(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', or 'file+stderr')",
                other
            ))
        }
    };
    Ok(destinations)
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. CLI arguments (applied to the config before this call)
/// 2. Environment variables (FINSYNTH_LOG, FINSYNTH_LOG_FORMAT, ...)
/// 3. Configuration file
/// 4. Defaults
pub fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let file_writer = if output.file {
        Some(Mutex::new(open_log_file(config)?))
    } else {
        None
    };
    let terminal = if output.stdout {
        Some(TerminalTarget::Stdout)
    } else if output.stderr {
        Some(TerminalTarget::Stderr)
    } else {
        None
    };
    let use_color = config.color;

    // Optional layers keep a single subscriber type across every combination.
    let registry = Registry::default().with(filter);
    match format {
        LogFormat::Json => {
            let terminal_layer = terminal.map(|target| {
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(target.make_writer())
            });
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer)
            });
            registry
                .with(terminal_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| EngineError::ConfigError(format!("Failed to init logging: {}", e)))
        }
        LogFormat::Text => {
            let terminal_layer = terminal.map(|target| {
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(target.make_writer())
            });
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer)
            });
            registry
                .with(terminal_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| EngineError::ConfigError(format!("Failed to init logging: {}", e)))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TerminalTarget {
    Stdout,
    Stderr,
}

impl TerminalTarget {
    fn make_writer(self) -> fmt::writer::BoxMakeWriter {
        match self {
            TerminalTarget::Stdout => fmt::writer::BoxMakeWriter::new(std::io::stdout),
            TerminalTarget::Stderr => fmt::writer::BoxMakeWriter::new(std::io::stderr),
        }
    }
}

fn open_log_file(config: &LoggingConfig) -> Result<std::fs::File, EngineError> {
    let log_file = &config.file;
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::ConfigError(format!("Failed to create log directory: {}", e))
            })?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| {
            EngineError::ConfigError(format!("Failed to open log file {:?}: {}", log_file, e))
        })
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, EngineError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_FILTER_VAR) {
        return Ok(filter);
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);

    for (module, module_level) in &config.modules {
        let directive = format!("{}={}", module, module_level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| EngineError::ConfigError(format!("Invalid log directive: {}", e)))?,
        );
    }

    if let Ok(modules) = std::env::var(LOG_MODULES_VAR) {
        for directive in parse_module_directives(&modules) {
            filter = filter.add_directive(directive.parse().map_err(|e| {
                EngineError::ConfigError(format!("Invalid log directive from env: {}", e))
            })?);
        }
    }

    Ok(filter)
}

/// `a=debug, b=warn` into `["a=debug", "b=warn"]`; malformed entries are ignored.
fn parse_module_directives(spec: &str) -> Vec<String> {
    spec.split(',')
        .filter_map(|entry| {
            let (module, level) = entry.split_once('=')?;
            let (module, level) = (module.trim(), level.trim());
            (!module.is_empty() && !level.is_empty()).then(|| format!("{}={}", module, level))
        })
        .collect()
}

fn determine_format(config: &LoggingConfig) -> Result<LogFormat, EngineError> {
    if let Ok(format) = std::env::var(LOG_FORMAT_VAR) {
        if let Ok(format) = parse_format(&format) {
            return Ok(format);
        }
    }
    parse_format(&config.format).map_err(EngineError::ConfigError)
}

fn determine_output(config: &LoggingConfig) -> Result<OutputDestinations, EngineError> {
    let output = std::env::var(LOG_OUTPUT_VAR).unwrap_or_else(|_| config.output.clone());
    parse_output_destinations(&output).map_err(EngineError::ConfigError)
}
