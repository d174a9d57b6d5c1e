//! Sled-backed checkpoint record.

use super::{decode, encode, CheckpointStore, EngineCheckpoint};
use crate::error::StorageError;
use sled::{Db, Tree};

const TREE_CHECKPOINT: &str = "engine_checkpoint";
const CHECKPOINT_KEY: &[u8] = b"current";

#[derive(Clone)]
pub struct SledCheckpointStore {
    tree: Tree,
}

impl SledCheckpointStore {
    pub fn new(db: &Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(TREE_CHECKPOINT)?,
        })
    }
}

impl CheckpointStore for SledCheckpointStore {
    fn write(&self, checkpoint: &EngineCheckpoint) -> Result<(), StorageError> {
        self.tree.insert(CHECKPOINT_KEY, encode(checkpoint)?)?;
        self.tree.flush()?;
        Ok(())
    }

    fn load(&self) -> Result<Option<EngineCheckpoint>, StorageError> {
        let Some(raw) = self.tree.get(CHECKPOINT_KEY)? else {
            return Ok(None);
        };
        decode(&raw).map(Some)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.tree.remove(CHECKPOINT_KEY)?;
        self.tree.flush()?;
        Ok(())
    }
}
