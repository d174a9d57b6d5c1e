//! In-process checkpoint record. Survives engine restarts within one process only.

use super::{CheckpointStore, EngineCheckpoint};
use crate::error::StorageError;
use parking_lot::Mutex;

#[derive(Default)]
pub struct MemoryCheckpointStore {
    record: Mutex<Option<EngineCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn write(&self, checkpoint: &EngineCheckpoint) -> Result<(), StorageError> {
        *self.record.lock() = Some(checkpoint.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<EngineCheckpoint>, StorageError> {
        Ok(self.record.lock().clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.record.lock() = None;
        Ok(())
    }
}
