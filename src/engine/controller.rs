//! Worker task that owns the job and runs the control loop.

use super::command::{respond, Command};
use super::{
    CustomerResult, CustomerStatus, EngineDeps, EngineSettings, EngineStatus, RunState,
    StatusCounts,
};
use crate::checkpoint::{CheckpointValidity, EngineCheckpoint};
use crate::dataset::SectionFlags;
use crate::error::EngineError;
use crate::flags::compute_flags;
use crate::types::{CustomerDescriptor, CustomerId, Period};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Everything that describes the current job.
pub(super) struct Job {
    pub(super) state: RunState,
    pub(super) period: Period,
    pub(super) overwrite_existing: bool,
    pub(super) current_index: usize,
    pub(super) customers: Vec<CustomerDescriptor>,
    pub(super) results: Vec<CustomerResult>,
    /// Customers with stored data for `period`, and which sections they have.
    pub(super) existing: HashMap<CustomerId, SectionFlags>,
}

impl Job {
    fn new(period: Period, overwrite_existing: bool) -> Self {
        Self {
            state: RunState::Idle,
            period,
            overwrite_existing,
            current_index: 0,
            customers: Vec::new(),
            results: Vec::new(),
            existing: HashMap::new(),
        }
    }

    fn has_existing(&self, customer_id: &CustomerId) -> bool {
        self.existing.contains_key(customer_id)
    }

    /// Results in directory order, derived from the existing-data snapshot.
    fn rebuild_results(&mut self) {
        self.results = self
            .customers
            .iter()
            .map(|customer| initial_result(customer, self.existing.get(&customer.id)))
            .collect();
    }

    pub(super) fn position_of(&self, customer_id: &CustomerId) -> Option<usize> {
        self.customers
            .iter()
            .position(|customer| &customer.id == customer_id)
    }

    fn checkpoint(&self) -> EngineCheckpoint {
        let mut existing_customer_ids: Vec<CustomerId> = self.existing.keys().cloned().collect();
        existing_customer_ids.sort();
        EngineCheckpoint {
            is_running: self.state.is_looping(),
            is_paused: self.state == RunState::Paused,
            current_index: self.current_index,
            results: self.results.clone(),
            overwrite_existing: self.overwrite_existing,
            period: self.period.clone(),
            existing_customer_ids,
            timestamp: Utc::now(),
        }
    }

    fn status(&self, manual: Option<&CustomerResult>, restored: bool) -> EngineStatus {
        EngineStatus {
            state: self.state,
            period: self.period.clone(),
            overwrite_existing: self.overwrite_existing,
            current_index: self.current_index,
            total: self.customers.len(),
            counts: StatusCounts::tally(&self.results),
            results: self.results.clone(),
            manual: manual.cloned(),
            restored,
        }
    }
}

pub(super) fn initial_result(
    customer: &CustomerDescriptor,
    existing: Option<&SectionFlags>,
) -> CustomerResult {
    match existing {
        Some(sections) => {
            let mut result = CustomerResult::new(customer.id.clone(), CustomerStatus::Existing)
                .with_name(&customer.name);
            result.existing_sections = Some(*sections);
            result
        }
        None => CustomerResult::new(customer.id.clone(), CustomerStatus::Pending)
            .with_name(&customer.name),
    }
}

/// A manual generation waiting to be saved.
pub(super) struct ManualSlot {
    pub(super) customer: CustomerDescriptor,
    pub(super) period: Period,
    pub(super) result: CustomerResult,
}

enum Driven<T> {
    Done(T),
    Command(Option<Command>),
}

pub(super) fn invalid(command: &'static str, state: RunState) -> EngineError {
    EngineError::InvalidTransition { command, state }
}

pub(super) struct JobController {
    pub(super) deps: EngineDeps,
    pub(super) job: Job,
    pub(super) manual: Option<ManualSlot>,
    item_delay: Duration,
    auto_resume: bool,
    restored: bool,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    shutdown_requested: bool,
    /// Commands that need the loop stopped first; replayed once it is.
    deferred: Vec<Command>,
    status_tx: watch::Sender<EngineStatus>,
}

impl JobController {
    pub(super) fn new(
        deps: EngineDeps,
        settings: EngineSettings,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let job = Job::new(settings.period, settings.overwrite_existing);
        let (status_tx, _) = watch::channel(job.status(None, false));
        Self {
            deps,
            job,
            manual: None,
            item_delay: settings.item_delay,
            auto_resume: settings.auto_resume,
            restored: false,
            commands,
            commands_open: true,
            shutdown_requested: false,
            deferred: Vec::new(),
            status_tx,
        }
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    /// Build the initial job from the directory and existing data, then apply the stored
    /// checkpoint if it still describes this period and directory.
    pub(super) async fn restore(&mut self) -> Result<(), EngineError> {
        self.job.customers = self.deps.directory.list_customers().await?;
        self.job.existing = self.query_existing(&self.job.period.clone());
        self.job.rebuild_results();

        if let Some(checkpoint) = self.load_checkpoint() {
            self.apply_checkpoint(checkpoint);
        }
        self.publish();
        Ok(())
    }

    fn load_checkpoint(&self) -> Option<EngineCheckpoint> {
        match self.deps.checkpoints.load() {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                warn!(error = %err, "checkpoint unreadable, discarding it");
                self.clear_checkpoint();
                None
            }
        }
    }

    fn apply_checkpoint(&mut self, checkpoint: EngineCheckpoint) {
        let validity = checkpoint.validity(&self.job.period, Utc::now());
        if validity != CheckpointValidity::Valid {
            info!(
                reason = ?validity,
                checkpoint_period = %checkpoint.period,
                period = %self.job.period,
                "discarding checkpoint"
            );
            self.clear_checkpoint();
            return;
        }
        if !self.aligned_with_directory(&checkpoint) {
            info!(
                checkpoint_customers = checkpoint.results.len(),
                directory_customers = self.job.customers.len(),
                "discarding checkpoint: customer directory changed"
            );
            self.clear_checkpoint();
            return;
        }
        if !checkpoint.is_running && !checkpoint.is_paused {
            self.clear_checkpoint();
            return;
        }

        let mut results = checkpoint.results;
        for (result, customer) in results.iter_mut().zip(&self.job.customers) {
            // Interrupted mid-call: the customer is generated again.
            if result.status == CustomerStatus::Processing {
                result.status = CustomerStatus::Pending;
            }
            if result.customer_name.is_empty() {
                result.customer_name = customer.name.clone();
            }
        }
        for customer_id in checkpoint.existing_customer_ids {
            self.job.existing.entry(customer_id).or_default();
        }
        self.job.results = results;
        self.job.current_index = checkpoint.current_index;
        self.job.overwrite_existing = checkpoint.overwrite_existing;
        self.job.state = if checkpoint.is_paused || !self.auto_resume {
            RunState::Paused
        } else {
            RunState::Running
        };
        self.restored = true;
        info!(
            state = %self.job.state,
            period = %self.job.period,
            current_index = self.job.current_index,
            total = self.job.customers.len(),
            "restored run from checkpoint"
        );
    }

    fn aligned_with_directory(&self, checkpoint: &EngineCheckpoint) -> bool {
        checkpoint.results.len() == self.job.customers.len()
            && checkpoint.current_index <= self.job.customers.len()
            && checkpoint
                .results
                .iter()
                .zip(&self.job.customers)
                .all(|(result, customer)| result.customer_id == customer.id)
    }

    /// Worker entry point. Returns when shut down or when every handle is gone.
    pub(super) async fn run(mut self) {
        debug!(state = %self.job.state, "engine worker started");
        loop {
            if self.job.state.is_looping() {
                self.drain_commands();
                match self.job.state {
                    RunState::Pausing => self.enter_paused(),
                    RunState::Stopping => {
                        self.enter_stopped();
                        self.run_deferred().await;
                    }
                    _ if self.shutdown_requested || !self.commands_open => {
                        self.suspend();
                        break;
                    }
                    _ => self.process_next().await,
                }
                continue;
            }

            if self.shutdown_requested || !self.commands_open {
                break;
            }
            match self.commands.recv().await {
                Some(command) => self.handle_command(command).await,
                None => self.commands_open = false,
            }
        }
        debug!(state = %self.job.state, "engine worker exiting");
    }

    /// One iteration of the control loop for the customer at `current_index`.
    async fn process_next(&mut self) {
        let index = self.job.current_index;
        let Some(customer) = self.job.customers.get(index).cloned() else {
            self.enter_completed();
            return;
        };

        if self.job.has_existing(&customer.id) && !self.job.overwrite_existing {
            debug!(customer_id = %customer.id, "stored data exists, skipping");
            self.job.results[index].status = CustomerStatus::Skipped;
            self.job.current_index = index + 1;
            self.persist_checkpoint();
            self.publish();
            return;
        }

        self.job.results[index].status = CustomerStatus::Processing;
        self.persist_checkpoint();
        self.publish();

        let period = self.job.period.clone();
        let flags = compute_flags(&customer.id);
        let generator = Arc::clone(&self.deps.generator);
        let request_customer = customer.clone();
        let request_period = period.clone();
        let outcome = self
            .drive(async move {
                generator
                    .generate(&request_customer, &flags, &request_period)
                    .await
            })
            .await;

        match outcome {
            Ok(dataset) => {
                let report = self.deps.persistence.save(&dataset, &customer, &period);
                if report.stored_any() {
                    self.job
                        .existing
                        .entry(customer.id.clone())
                        .or_default()
                        .merge(report.saved_flags());
                }
                self.job.results[index].mark_generated(dataset, &report);
                debug!(
                    customer_id = %customer.id,
                    client = self.deps.generator.client_name(),
                    status = %self.job.results[index].status,
                    saved = report.saved.len(),
                    failed = report.failed.len(),
                    "customer generated"
                );
            }
            Err(err) => {
                warn!(
                    customer_id = %customer.id,
                    client = self.deps.generator.client_name(),
                    error = %err,
                    "generation failed"
                );
                self.job.results[index].mark_failed(err.to_string());
            }
        }

        self.job.current_index = index + 1;
        self.persist_checkpoint();
        self.publish();

        let more_remaining = index + 1 < self.job.customers.len();
        if more_remaining && self.job.state == RunState::Running && !self.item_delay.is_zero() {
            self.wait_between_customers().await;
        }
    }

    /// Await `work` while still answering commands.
    async fn drive<F: Future>(&mut self, work: F) -> F::Output {
        tokio::pin!(work);
        loop {
            if !self.commands_open {
                return work.await;
            }
            let event = tokio::select! {
                output = &mut work => Driven::Done(output),
                command = self.commands.recv() => Driven::Command(command),
            };
            match event {
                Driven::Done(output) => return output,
                Driven::Command(Some(command)) => self.handle_in_flight(command),
                Driven::Command(None) => self.commands_open = false,
            }
        }
    }

    /// Inter-customer delay. Ends early once a pause, stop or shutdown is pending.
    async fn wait_between_customers(&mut self) {
        let deadline = tokio::time::sleep(self.item_delay);
        tokio::pin!(deadline);
        loop {
            if self.job.state != RunState::Running
                || self.shutdown_requested
                || !self.commands_open
            {
                return;
            }
            let event = tokio::select! {
                _ = &mut deadline => Driven::Done(()),
                command = self.commands.recv() => Driven::Command(command),
            };
            match event {
                Driven::Done(()) => return,
                Driven::Command(Some(command)) => self.handle_in_flight(command),
                Driven::Command(None) => self.commands_open = false,
            }
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle_in_flight(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.commands_open = false;
                    break;
                }
            }
        }
    }

    /// Commands received while the loop is iterating. Nothing here awaits; requests that
    /// change the loop are recorded and observed at the next customer boundary.
    fn handle_in_flight(&mut self, command: Command) {
        let state = self.job.state;
        debug!(command = command.name(), state = %state, "command received mid-run");
        match command {
            Command::Pause { reply } => {
                let result = match state {
                    RunState::Running => {
                        self.job.state = RunState::Pausing;
                        info!(current_index = self.job.current_index, "pause requested");
                        self.publish();
                        Ok(())
                    }
                    RunState::Pausing => Ok(()),
                    _ => Err(invalid("pause", state)),
                };
                respond(reply, result);
            }
            Command::Resume { reply } => {
                let result = match state {
                    RunState::Pausing => {
                        self.job.state = RunState::Running;
                        info!("pause request withdrawn");
                        self.publish();
                        Ok(())
                    }
                    _ => Err(invalid("resume", state)),
                };
                respond(reply, result);
            }
            Command::Stop { reply } => {
                self.request_stop();
                respond(reply, Ok(()));
            }
            Command::Reset { .. } | Command::SelectPeriod { .. } => {
                self.request_stop();
                self.deferred.push(command);
            }
            Command::Shutdown { reply } => {
                self.shutdown_requested = true;
                respond(reply, Ok(()));
            }
            Command::Start { reply } => respond(reply, Err(invalid("start", state))),
            Command::SetOverwrite { reply, .. } => {
                respond(reply, Err(invalid("change overwrite", state)))
            }
            Command::RunOne { reply, .. } => respond(reply, Err(invalid("run one", state))),
            Command::SaveOne { reply } => respond(reply, Err(invalid("save one", state))),
        }
    }

    fn request_stop(&mut self) {
        if self.job.state != RunState::Stopping {
            self.job.state = RunState::Stopping;
            info!(current_index = self.job.current_index, "stop requested");
            self.publish();
        }
    }

    /// Commands received while no loop is iterating.
    async fn handle_command(&mut self, command: Command) {
        let state = self.job.state;
        debug!(command = command.name(), state = %state, "command received");
        match command {
            Command::Start { reply } => {
                let result = self.start_job().await;
                respond(reply, result);
            }
            Command::Pause { reply } => respond(reply, Err(invalid("pause", state))),
            Command::Resume { reply } => {
                let result = self.resume_paused();
                respond(reply, result);
            }
            Command::Stop { reply } => {
                let result = if state == RunState::Paused {
                    self.enter_stopped();
                    Ok(())
                } else {
                    Err(invalid("stop", state))
                };
                respond(reply, result);
            }
            Command::Reset { reply } => {
                self.reset_job().await;
                respond(reply, Ok(()));
            }
            Command::SelectPeriod { period, reply } => {
                let result = self.select_period(period).await;
                respond(reply, result);
            }
            Command::SetOverwrite { overwrite, reply } => {
                let result = if state.is_active() {
                    Err(invalid("change overwrite", state))
                } else {
                    self.job.overwrite_existing = overwrite;
                    debug!(overwrite, "overwrite setting changed");
                    self.publish();
                    Ok(())
                };
                respond(reply, result);
            }
            Command::RunOne { customer_id, reply } => {
                let result = if state.is_active() {
                    Err(invalid("run one", state))
                } else {
                    self.run_one(customer_id).await
                };
                respond(reply, result);
            }
            Command::SaveOne { reply } => {
                let result = if state.is_active() {
                    Err(invalid("save one", state))
                } else {
                    self.save_one()
                };
                respond(reply, result);
            }
            Command::Shutdown { reply } => {
                self.shutdown_requested = true;
                respond(reply, Ok(()));
            }
        }
    }

    async fn run_deferred(&mut self) {
        for command in std::mem::take(&mut self.deferred) {
            self.handle_command(command).await;
        }
    }

    async fn start_job(&mut self) -> Result<(), EngineError> {
        let state = self.job.state;
        if !state.can_start() {
            return Err(invalid("start", state));
        }
        let customers = self.deps.directory.list_customers().await?;
        if customers.is_empty() {
            return Err(EngineError::EmptyDirectory);
        }
        let existing = self.deps.persistence.existing_sections(&self.job.period)?;

        self.job.customers = customers;
        self.job.existing = existing;
        self.job.current_index = 0;
        self.job.rebuild_results();
        self.job.state = RunState::Running;
        self.restored = false;
        info!(
            period = %self.job.period,
            customers = self.job.customers.len(),
            existing = self.job.existing.len(),
            overwrite = self.job.overwrite_existing,
            "generation run started"
        );
        self.persist_checkpoint();
        self.publish();
        Ok(())
    }

    fn resume_paused(&mut self) -> Result<(), EngineError> {
        let state = self.job.state;
        if state != RunState::Paused {
            return Err(invalid("resume", state));
        }
        self.job.state = RunState::Running;
        info!(
            current_index = self.job.current_index,
            total = self.job.customers.len(),
            "run resumed"
        );
        self.persist_checkpoint();
        self.publish();
        Ok(())
    }

    async fn reset_job(&mut self) {
        self.clear_checkpoint();
        self.refresh_customers().await;
        self.job.existing = self.query_existing(&self.job.period.clone());
        self.return_to_idle();
        info!(period = %self.job.period, "job reset");
    }

    async fn select_period(&mut self, period: Period) -> Result<(), EngineError> {
        let existing = self.deps.persistence.existing_sections(&period)?;
        self.clear_checkpoint();
        self.refresh_customers().await;
        self.job.period = period;
        self.job.existing = existing;
        self.return_to_idle();
        info!(
            period = %self.job.period,
            existing = self.job.existing.len(),
            "period selected"
        );
        Ok(())
    }

    fn return_to_idle(&mut self) {
        self.job.state = RunState::Idle;
        self.job.current_index = 0;
        self.job.rebuild_results();
        self.restored = false;
        self.publish();
    }

    async fn refresh_customers(&mut self) {
        match self.deps.directory.list_customers().await {
            Ok(customers) => self.job.customers = customers,
            Err(err) => {
                warn!(error = %err, "customer directory unavailable, keeping previous list");
            }
        }
    }

    fn query_existing(&self, period: &Period) -> HashMap<CustomerId, SectionFlags> {
        match self.deps.persistence.existing_sections(period) {
            Ok(existing) => existing,
            Err(err) => {
                warn!(period = %period, error = %err, "existing-data query failed");
                HashMap::new()
            }
        }
    }

    fn enter_paused(&mut self) {
        self.job.state = RunState::Paused;
        self.persist_checkpoint();
        self.publish();
        info!(
            current_index = self.job.current_index,
            total = self.job.customers.len(),
            "run paused"
        );
    }

    fn enter_stopped(&mut self) {
        self.job.state = RunState::Stopped;
        self.clear_checkpoint();
        self.publish();
        info!(current_index = self.job.current_index, "run stopped");
    }

    fn enter_completed(&mut self) {
        self.job.state = RunState::Completed;
        self.clear_checkpoint();
        self.publish();
        let counts = StatusCounts::tally(&self.job.results);
        info!(
            period = %self.job.period,
            success = counts.success,
            partial_success = counts.partial_success,
            error = counts.error,
            skipped = counts.skipped,
            "run completed"
        );
    }

    /// Leave an active run checkpointed as running so the next launch resumes it.
    fn suspend(&mut self) {
        self.persist_checkpoint();
        self.publish();
        info!(
            current_index = self.job.current_index,
            "engine shutting down mid-run, checkpoint kept for resume"
        );
    }

    fn persist_checkpoint(&self) {
        if let Err(err) = self.deps.checkpoints.save(self.job.checkpoint()) {
            warn!(error = %err, "failed to write checkpoint");
        }
    }

    fn clear_checkpoint(&self) {
        if let Err(err) = self.deps.checkpoints.clear() {
            warn!(error = %err, "failed to clear checkpoint");
        }
    }

    pub(super) fn publish(&self) {
        let manual = self.manual.as_ref().map(|slot| &slot.result);
        self.status_tx
            .send_replace(self.job.status(manual, self.restored));
    }
}
