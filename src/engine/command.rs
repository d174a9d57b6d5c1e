//! Commands delivered to the engine worker.

use super::CustomerResult;
use crate::error::EngineError;
use crate::types::{CustomerId, Period};
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

#[derive(Debug)]
pub enum Command {
    Start { reply: Reply<()> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Stop { reply: Reply<()> },
    Reset { reply: Reply<()> },
    SelectPeriod { period: Period, reply: Reply<()> },
    SetOverwrite { overwrite: bool, reply: Reply<()> },
    RunOne { customer_id: CustomerId, reply: Reply<CustomerResult> },
    SaveOne { reply: Reply<CustomerResult> },
    /// Exit the worker. An active run is checkpointed first so the next launch resumes it.
    Shutdown { reply: Reply<()> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Pause { .. } => "pause",
            Command::Resume { .. } => "resume",
            Command::Stop { .. } => "stop",
            Command::Reset { .. } => "reset",
            Command::SelectPeriod { .. } => "select period",
            Command::SetOverwrite { .. } => "set overwrite",
            Command::RunOne { .. } => "run one",
            Command::SaveOne { .. } => "save one",
            Command::Shutdown { .. } => "shut down",
        }
    }
}

pub(crate) fn respond<T>(reply: Reply<T>, result: Result<T, EngineError>) {
    // The caller may have given up waiting; nothing to do then.
    let _ = reply.send(result);
}
