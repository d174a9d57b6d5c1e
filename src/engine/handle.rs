//! Cloneable front end of the engine worker.

use super::command::{Command, Reply};
use super::{CustomerResult, EngineStatus};
use crate::error::EngineError;
use crate::types::{CustomerId, Period};
use tokio::sync::{mpsc, oneshot, watch};

/// Sends commands to the worker and observes its published status.
///
/// Every command is answered once the worker has applied it. `pause` and `stop` issued
/// during a run are answered as soon as the request is recorded; the transition itself
/// happens at the next customer boundary and can be awaited with [`EngineHandle::wait_for`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    pub(super) fn new(commands: mpsc::Sender<Command>, status: watch::Receiver<EngineStatus>) -> Self {
        Self { commands, status }
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Start { reply }).await
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn select_period(&self, period: Period) -> Result<(), EngineError> {
        self.request(|reply| Command::SelectPeriod { period, reply })
            .await
    }

    pub async fn set_overwrite(&self, overwrite: bool) -> Result<(), EngineError> {
        self.request(|reply| Command::SetOverwrite { overwrite, reply })
            .await
    }

    /// Generate one customer outside the queue. The result is held until `save_one`.
    pub async fn run_one(&self, customer_id: CustomerId) -> Result<CustomerResult, EngineError> {
        self.request(|reply| Command::RunOne { customer_id, reply })
            .await
    }

    /// Persist the held manual result.
    pub async fn save_one(&self) -> Result<CustomerResult, EngineError> {
        self.request(|reply| Command::SaveOne { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Latest published status.
    pub fn status(&self) -> EngineStatus {
        EngineStatus::clone(&self.status.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<EngineStatus, EngineError>
    where
        F: FnMut(&EngineStatus) -> bool,
    {
        let mut rx = self.status.clone();
        let guard = rx
            .wait_for(predicate)
            .await
            .map_err(|_| EngineError::EngineShutDown)?;
        Ok(EngineStatus::clone(&guard))
    }

    /// Wait until the control loop is no longer iterating.
    pub async fn wait_until_settled(&self) -> Result<EngineStatus, EngineError> {
        self.wait_for(|status| !status.state.is_looping()).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| EngineError::EngineShutDown)?;
        response.await.map_err(|_| EngineError::EngineShutDown)?
    }
}
