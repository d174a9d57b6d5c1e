//! Checkpoint kept as a standalone JSON file.
//!
//! Writes go to a sibling temp file which is then renamed over the target, so readers
//! never observe a half-written snapshot.

use super::{decode, encode, CheckpointStore, EngineCheckpoint};
use crate::error::StorageError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn write(&self, checkpoint: &EngineCheckpoint) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        fs::write(&temp, encode(checkpoint)?)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<EngineCheckpoint>, StorageError> {
        match fs::read(&self.path) {
            Ok(raw) => decode(&raw).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}
