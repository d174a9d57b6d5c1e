//! CLI route: single route table and run context. Wires stores and clients into the engine
//! and dispatches to presentation.

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, SledCheckpointStore};
use crate::cli::help::{command_name, needs_generator};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_flags_json, format_flags_text, format_manual_result, format_progress_line,
    format_run_summary, format_status_json, format_status_text,
};
use crate::config::{CheckpointBackend, ConfigLoader, FinsynthConfig};
use crate::directory::JsonFileDirectory;
use crate::engine::{
    CustomerStatus, Engine, EngineDeps, EngineHandle, EngineSettings, EngineStatus, RunState,
};
use crate::error::{EngineError, StorageError};
use crate::flags::{bucket, compute_flags};
use crate::generation::{create_client, GenerationClient, UnconfiguredClient};
use crate::persistence::sled_store::SledDatasetStore;
use crate::persistence::PersistenceAdapter;
use crate::types::{CustomerId, Period};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runtime context for CLI execution: workspace and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: FinsynthConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, EngineError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        config.ensure_valid()?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &FinsynthConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, EngineError> {
        let started = Instant::now();
        let name = command_name(command);
        debug!(command = name, "executing command");
        let result = self.execute_inner(command).await;
        match &result {
            Ok(_) => info!(
                command = name,
                duration_ms = started.elapsed().as_millis() as u64,
                "command finished"
            ),
            Err(err) => warn!(command = name, error = %err, "command failed"),
        }
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, EngineError> {
        match command {
            Commands::Flags {
                customer_id,
                format,
            } => self.handle_flags(customer_id, format),
            Commands::Run { period, overwrite } => {
                let engine = self.launch(command, period.as_deref(), true, *overwrite).await?;
                self.handle_run(engine).await
            }
            Commands::Resume { period } => {
                let engine = self.launch(command, period.as_deref(), false, false).await?;
                self.handle_resume(engine).await
            }
            Commands::Status { period, format } => {
                let engine = self.launch(command, period.as_deref(), false, false).await?;
                let status = engine.status();
                engine.shutdown().await?;
                if format == "json" {
                    format_status_json(&status)
                } else {
                    Ok(format_status_text(&status))
                }
            }
            Commands::Stop { period } => {
                let engine = self.launch(command, period.as_deref(), false, false).await?;
                self.handle_stop(engine).await
            }
            Commands::Reset { period } => {
                let engine = self.launch(command, None, false, false).await?;
                self.handle_reset(engine, period.as_deref()).await
            }
            Commands::GenerateOne {
                customer_id,
                period,
                yes,
            } => {
                let engine = self.launch(command, period.as_deref(), false, false).await?;
                self.handle_generate_one(engine, customer_id, *yes).await
            }
        }
    }

    /// Open the stores, pick the period and launch an engine.
    ///
    /// Without an explicit period the checkpointed period is preferred, so a pending run is
    /// picked up instead of being discarded as a period mismatch.
    async fn launch(
        &self,
        command: &Commands,
        period: Option<&str>,
        auto_resume: bool,
        overwrite: bool,
    ) -> Result<Engine, EngineError> {
        let store_path = self.config.storage.resolved_store_path(&self.workspace_root);
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let db = sled::open(&store_path).map_err(StorageError::from)?;

        let dataset_store = Arc::new(SledDatasetStore::from_db(db.clone())?);
        let checkpoints: Arc<dyn CheckpointStore> = match self.config.storage.checkpoint_backend {
            CheckpointBackend::Sled => Arc::new(SledCheckpointStore::new(&db)?),
            CheckpointBackend::File => Arc::new(FileCheckpointStore::new(
                self.config
                    .storage
                    .resolved_checkpoint_path(&self.workspace_root),
            )),
        };

        let period = match period {
            Some(period) => Some(period.parse::<Period>()?),
            None => checkpointed_period(checkpoints.as_ref()),
        };
        let settings: EngineSettings = self
            .config
            .engine_settings(period)?
            .with_auto_resume(auto_resume);
        let settings = if overwrite {
            settings.with_overwrite(true)
        } else {
            settings
        };

        let generator: Arc<dyn GenerationClient> = if needs_generator(command) {
            create_client(&self.config.generation)?
        } else {
            Arc::new(UnconfiguredClient)
        };
        let directory = Arc::new(JsonFileDirectory::new(
            self.config.directory.resolved_path(&self.workspace_root),
        ));

        let deps = EngineDeps {
            directory,
            generator,
            persistence: PersistenceAdapter::new(dataset_store),
            checkpoints,
        };
        Engine::launch(deps, settings).await
    }

    fn handle_flags(&self, customer_id: &str, format: &str) -> Result<String, EngineError> {
        let customer_id = CustomerId::new(customer_id);
        let flags = compute_flags(&customer_id);
        let r = bucket(&customer_id);
        if format == "json" {
            format_flags_json(&customer_id, r, &flags)
        } else {
            Ok(format_flags_text(&customer_id, r, &flags))
        }
    }

    async fn handle_run(&self, engine: Engine) -> Result<String, EngineError> {
        let handle = engine.handle();
        let status = handle.status();
        match status.state {
            RunState::Running => {
                eprintln!(
                    "Resuming interrupted run for {} at {}/{}",
                    status.period, status.current_index, status.total
                );
            }
            RunState::Paused => {
                engine.shutdown().await?;
                return Ok(format!(
                    "A paused run exists for {} ({}/{}).\n\
                     Use `finsynth resume` to continue it or `finsynth stop` to discard it.",
                    status.period, status.current_index, status.total
                ));
            }
            _ => handle.start().await?,
        }
        let final_status = supervise(&handle).await?;
        engine.shutdown().await?;
        Ok(format_run_summary(&final_status))
    }

    async fn handle_resume(&self, engine: Engine) -> Result<String, EngineError> {
        let handle = engine.handle();
        let status = handle.status();
        if status.state != RunState::Paused {
            engine.shutdown().await?;
            return Ok(format!("No paused run for {}.", status.period));
        }
        handle.resume().await?;
        let final_status = supervise(&handle).await?;
        engine.shutdown().await?;
        Ok(format_run_summary(&final_status))
    }

    async fn handle_stop(&self, engine: Engine) -> Result<String, EngineError> {
        let handle = engine.handle();
        let status = handle.status();
        let message = if status.state == RunState::Paused {
            handle.stop().await?;
            format!(
                "Stopped run for {} at {}/{}; checkpoint discarded.",
                status.period, status.current_index, status.total
            )
        } else {
            format!("No paused run for {}.", status.period)
        };
        engine.shutdown().await?;
        Ok(message)
    }

    async fn handle_reset(
        &self,
        engine: Engine,
        period: Option<&str>,
    ) -> Result<String, EngineError> {
        let handle = engine.handle();
        match period {
            Some(period) => handle.select_period(period.parse()?).await?,
            None => handle.reset().await?,
        }
        let status = handle.status();
        engine.shutdown().await?;
        Ok(format!(
            "Reset {}: {} customers, {} with stored data.",
            status.period, status.total, status.counts.existing
        ))
    }

    async fn handle_generate_one(
        &self,
        engine: Engine,
        customer_id: &str,
        yes: bool,
    ) -> Result<String, EngineError> {
        let handle = engine.handle();
        let result = handle.run_one(CustomerId::new(customer_id)).await?;
        let mut out = format_manual_result(&result)?;

        if result.status == CustomerStatus::Success {
            let save = if yes {
                true
            } else {
                println!("{}", out);
                out.clear();
                use dialoguer::Confirm;
                Confirm::new()
                    .with_prompt(format!("Save dataset for '{}'?", customer_id))
                    .default(true)
                    .interact()
                    .map_err(|e| {
                        EngineError::ConfigError(format!("Failed to get user input: {}", e))
                    })?
            };
            if save {
                let saved = handle.save_one().await?;
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("Saved: {}", saved.status));
            } else {
                out.push_str("Not saved.");
            }
        }
        engine.shutdown().await?;
        Ok(out)
    }
}

fn checkpointed_period(checkpoints: &dyn CheckpointStore) -> Option<Period> {
    match checkpoints.load() {
        Ok(checkpoint) => checkpoint.map(|checkpoint| checkpoint.period),
        Err(err) => {
            warn!(error = %err, "could not read checkpoint to pick the period");
            None
        }
    }
}

/// Follow a run until the loop settles, printing each finished customer.
/// The first Ctrl-C requests a pause.
async fn supervise(handle: &EngineHandle) -> Result<EngineStatus, EngineError> {
    let mut updates = handle.subscribe();
    let mut reported = updates.borrow().current_index;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let status = EngineStatus::clone(&updates.borrow_and_update());
        let finished = status.current_index.min(status.results.len());
        while reported < finished {
            eprintln!(
                "{}",
                format_progress_line(reported + 1, status.total, &status.results[reported])
            );
            reported += 1;
        }
        if !status.state.is_looping() {
            return Ok(status);
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(handle.status());
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("Pausing after the current customer...");
                match handle.pause().await {
                    Ok(()) | Err(EngineError::InvalidTransition { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
    }
}
