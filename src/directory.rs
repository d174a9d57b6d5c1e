//! Customer directory input.
//!
//! The directory is an ordered, read-only list of customer descriptors. The engine pulls
//! it once per job start (and once at restore); it never writes back.

use crate::error::EngineError;
use crate::persistence::RecordKey;
use crate::types::{CustomerDescriptor, CustomerId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Return every customer in processing order.
    async fn list_customers(&self) -> Result<Vec<CustomerDescriptor>, EngineError>;
}

/// Directory backed by a JSON array of `{id, name, segment, sector}` objects.
pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CustomerDirectory for JsonFileDirectory {
    async fn list_customers(&self) -> Result<Vec<CustomerDescriptor>, EngineError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            EngineError::DirectoryError(format!(
                "Failed to read customer directory {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let customers: Vec<CustomerDescriptor> = serde_json::from_slice(&raw).map_err(|e| {
            EngineError::DirectoryError(format!(
                "Failed to parse customer directory {}: {}",
                self.path.display(),
                e
            ))
        })?;
        validate_ids(&customers)?;
        Ok(customers)
    }
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    customers: Vec<CustomerDescriptor>,
}

impl StaticDirectory {
    pub fn new(customers: Vec<CustomerDescriptor>) -> Self {
        Self { customers }
    }
}

#[async_trait]
impl CustomerDirectory for StaticDirectory {
    async fn list_customers(&self) -> Result<Vec<CustomerDescriptor>, EngineError> {
        validate_ids(&self.customers)?;
        Ok(self.customers.clone())
    }
}

/// Queue positions and stored keys are keyed by customer id, so ids must be non-empty,
/// encodable in a record key and unique.
fn validate_ids(customers: &[CustomerDescriptor]) -> Result<(), EngineError> {
    let mut seen: HashSet<&CustomerId> = HashSet::new();
    for (position, customer) in customers.iter().enumerate() {
        if !RecordKey::accepts_customer_id(&customer.id) {
            return Err(EngineError::DirectoryError(format!(
                "Invalid customer id at position {}: {:?}",
                position,
                customer.id.as_str()
            )));
        }
        if !seen.insert(&customer.id) {
            return Err(EngineError::DirectoryError(format!(
                "Duplicate customer id in directory: {}",
                customer.id
            )));
        }
    }
    Ok(())
}
