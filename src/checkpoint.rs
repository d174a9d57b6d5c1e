//! Checkpoint Store
//!
//! A single durable JSON snapshot of in-flight engine state. Each save replaces the whole
//! record; there is no event log. A snapshot is only used for recovery when it belongs to
//! the selected period and is younger than [`CHECKPOINT_MAX_AGE_HOURS`].

pub mod file;
pub mod memory;
pub mod sled_store;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use sled_store::SledCheckpointStore;

use crate::engine::CustomerResult;
use crate::error::StorageError;
use crate::types::{CustomerId, Period};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Snapshots older than this are never used for recovery.
pub const CHECKPOINT_MAX_AGE_HOURS: i64 = 24;

pub fn checkpoint_max_age() -> Duration {
    Duration::hours(CHECKPOINT_MAX_AGE_HOURS)
}

/// Durable snapshot of engine progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCheckpoint {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_index: usize,
    pub results: Vec<CustomerResult>,
    pub overwrite_existing: bool,
    pub period: Period,
    pub existing_customer_ids: Vec<CustomerId>,
    pub timestamp: DateTime<Utc>,
}

/// Why a loaded snapshot can or cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointValidity {
    Valid,
    PeriodMismatch,
    Stale,
}

impl EngineCheckpoint {
    pub fn validity(&self, current_period: &Period, now: DateTime<Utc>) -> CheckpointValidity {
        if &self.period != current_period {
            CheckpointValidity::PeriodMismatch
        } else if now.signed_duration_since(self.timestamp) >= checkpoint_max_age() {
            CheckpointValidity::Stale
        } else {
            CheckpointValidity::Valid
        }
    }

    /// True iff the snapshot matches the period and is younger than 24 hours.
    pub fn is_valid(&self, current_period: &Period, now: DateTime<Utc>) -> bool {
        self.validity(current_period, now) == CheckpointValidity::Valid
    }
}

/// Single-record checkpoint storage.
pub trait CheckpointStore: Send + Sync {
    /// Replace the stored record with exactly this snapshot.
    fn write(&self, checkpoint: &EngineCheckpoint) -> Result<(), StorageError>;

    /// The stored snapshot, if any.
    fn load(&self) -> Result<Option<EngineCheckpoint>, StorageError>;

    /// Remove the stored snapshot. Clearing an absent record is not an error.
    fn clear(&self) -> Result<(), StorageError>;

    /// Stamp the snapshot with the current time and write it.
    fn save(&self, mut checkpoint: EngineCheckpoint) -> Result<(), StorageError> {
        checkpoint.timestamp = Utc::now();
        self.write(&checkpoint)
    }
}

pub(crate) fn encode(checkpoint: &EngineCheckpoint) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(checkpoint).map_err(|e| StorageError::Encode(e.to_string()))
}

pub(crate) fn decode(raw: &[u8]) -> Result<EngineCheckpoint, StorageError> {
    serde_json::from_slice(raw).map_err(|e| StorageError::Decode(e.to_string()))
}
