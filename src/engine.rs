//! Job Controller
//!
//! One engine owns one job: an ordered pass over the customer directory for a single
//! period. A single worker task owns all job state and applies commands from
//! [`EngineHandle`]s one at a time, so there is never more than one control loop. Progress
//! is published on a watch channel and written to the checkpoint store after every
//! customer, which lets a later launch pick the run up where it left off.

mod command;
mod controller;
mod handle;
mod manual;
mod result;
mod state;

pub use handle::EngineHandle;
pub use result::{CustomerResult, CustomerStatus, StatusCounts};
pub use state::RunState;

use crate::checkpoint::CheckpointStore;
use crate::directory::CustomerDirectory;
use crate::error::EngineError;
use crate::generation::GenerationClient;
use crate::persistence::PersistenceAdapter;
use crate::types::Period;
use controller::JobController;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

const COMMAND_BUFFER: usize = 32;

/// Pause between consecutive customers unless configured otherwise.
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_millis(2000);

/// Collaborators the controller drives.
#[derive(Clone)]
pub struct EngineDeps {
    pub directory: Arc<dyn CustomerDirectory>,
    pub generator: Arc<dyn GenerationClient>,
    pub persistence: PersistenceAdapter,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Period selected at launch.
    pub period: Period,
    /// Initial overwrite setting; a restored checkpoint takes precedence.
    pub overwrite_existing: bool,
    /// Wait between consecutive customers. Zero disables the wait.
    pub item_delay: Duration,
    /// Continue a run that was interrupted while running. When off it is restored paused.
    pub auto_resume: bool,
}

impl EngineSettings {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            overwrite_existing: false,
            item_delay: DEFAULT_ITEM_DELAY,
            auto_resume: true,
        }
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn with_auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }
}

/// Snapshot of the job published after every state change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: RunState,
    pub period: Period,
    pub overwrite_existing: bool,
    pub current_index: usize,
    pub total: usize,
    pub counts: StatusCounts,
    pub results: Vec<CustomerResult>,
    /// Result of the last manual generation that has not been saved yet.
    pub manual: Option<CustomerResult>,
    /// The job was rebuilt from a checkpoint at launch.
    pub restored: bool,
}

impl EngineStatus {
    pub fn progress_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current_index.min(self.total) as f64 / self.total as f64
        }
    }
}

/// A launched engine: the worker task plus a handle to it.
pub struct Engine {
    handle: EngineHandle,
    worker: JoinHandle<()>,
}

impl Engine {
    /// Rebuild job state (restoring a checkpoint when one applies) and spawn the worker.
    ///
    /// A restored checkpoint that was running resumes immediately unless
    /// [`EngineSettings::auto_resume`] is off.
    pub async fn launch(deps: EngineDeps, settings: EngineSettings) -> Result<Self, EngineError> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let mut controller = JobController::new(deps, settings, command_rx);
        controller.restore().await?;
        let status_rx = controller.subscribe();
        let worker = tokio::spawn(controller.run());
        Ok(Self {
            handle: EngineHandle::new(command_tx, status_rx),
            worker,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.handle.status()
    }

    /// Ask the worker to exit and wait for it. An active run finishes its current
    /// customer and is checkpointed before the worker returns.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        match self.handle.shutdown().await {
            Ok(()) | Err(EngineError::EngineShutDown) => {}
            Err(err) => return Err(err),
        }
        drop(self.handle);
        if let Err(err) = self.worker.await {
            warn!(error = %err, "engine worker ended abnormally");
            return Err(EngineError::EngineShutDown);
        }
        Ok(())
    }
}
