//! Persistence Adapter
//!
//! Writes each section of a generated dataset to its own table with idempotent upserts
//! keyed by natural composite keys (period, customer id, per-section discriminator).
//! Sections are saved independently: one failing section is logged and reported but
//! does not prevent the others from being attempted.

pub mod sled_store;

pub use sled_store::SledDatasetStore;

use crate::dataset::{GeneratedDataset, SectionFlags, SectionKind};
use crate::error::StorageError;
use crate::types::{CustomerDescriptor, CustomerId, Period};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_SEPARATOR: char = '\u{1f}';

/// Natural composite key of one stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub period: Period,
    pub customer_id: CustomerId,
    /// Account id, provider code or collateral id. `None` for the one-per-customer summary.
    pub discriminator: Option<String>,
}

impl RecordKey {
    pub fn new(period: &Period, customer_id: &CustomerId, discriminator: Option<&str>) -> Self {
        Self {
            period: period.clone(),
            customer_id: customer_id.clone(),
            discriminator: discriminator.map(str::to_string),
        }
    }

    pub fn encode(&self) -> String {
        let mut key = format!(
            "{}{sep}{}{sep}",
            self.period,
            self.customer_id,
            sep = KEY_SEPARATOR
        );
        if let Some(discriminator) = &self.discriminator {
            key.push_str(discriminator);
        }
        key
    }

    /// Prefix covering every row of a period.
    pub fn period_prefix(period: &Period) -> String {
        format!("{}{}", period, KEY_SEPARATOR)
    }

    /// Prefix covering every row of one customer in a period.
    pub fn customer_prefix(period: &Period, customer_id: &CustomerId) -> String {
        format!(
            "{}{sep}{}{sep}",
            period,
            customer_id,
            sep = KEY_SEPARATOR
        )
    }

    /// Whether `customer_id` can be encoded without colliding with another customer's keys.
    pub fn accepts_customer_id(customer_id: &CustomerId) -> bool {
        !customer_id.as_str().is_empty() && !customer_id.as_str().contains(KEY_SEPARATOR)
    }

    /// Extract the customer id segment from an encoded key.
    pub fn customer_from_encoded(encoded: &str) -> Option<CustomerId> {
        let mut parts = encoded.splitn(3, KEY_SEPARATOR);
        parts.next()?;
        let customer = parts.next()?;
        parts.next()?;
        Some(CustomerId::new(customer))
    }
}

/// One row as written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub period: String,
    pub customer_id: String,
    pub customer_name: String,
    pub section: SectionKind,
    pub discriminator: Option<String>,
    pub payload: Value,
    pub stored_at: chrono::DateTime<chrono::Utc>,
}

/// Durable multi-table store.
pub trait DatasetStore: Send + Sync {
    /// Upsert every row of one section. Either all rows land or the section fails.
    fn upsert_section(
        &self,
        section: SectionKind,
        rows: Vec<(RecordKey, StoredRecord)>,
    ) -> Result<(), StorageError>;

    /// Customers with at least one stored row per section for the period.
    fn existing_sections(
        &self,
        period: &Period,
    ) -> Result<HashMap<CustomerId, SectionFlags>, StorageError>;

    /// All rows stored for one customer's section in a period.
    fn load_section(
        &self,
        section: SectionKind,
        period: &Period,
        customer_id: &CustomerId,
    ) -> Result<Vec<StoredRecord>, StorageError>;
}

/// A section that could not be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFailure {
    pub section: SectionKind,
    pub message: String,
}

/// Outcome of saving one dataset. Present but empty sections appear in neither list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceReport {
    pub saved: Vec<SectionKind>,
    pub failed: Vec<SectionFailure>,
}

impl PersistenceReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// True when at least one section wrote at least one row.
    pub fn stored_any(&self) -> bool {
        !self.saved.is_empty()
    }

    pub fn saved_flags(&self) -> SectionFlags {
        self.saved.iter().copied().collect()
    }
}

/// Splits datasets into per-section rows and saves each section independently.
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn DatasetStore>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DatasetStore> {
        &self.store
    }

    pub fn save(
        &self,
        dataset: &GeneratedDataset,
        customer: &CustomerDescriptor,
        period: &Period,
    ) -> PersistenceReport {
        let mut report = PersistenceReport::default();
        for section in dataset.present_sections() {
            let outcome = section_rows(dataset, section, customer, period).and_then(|rows| {
                let written = rows.len();
                if written > 0 {
                    self.store.upsert_section(section, rows)?;
                }
                Ok(written)
            });
            match outcome {
                Ok(0) => {
                    debug!(customer_id = %customer.id, section = %section, "section empty, nothing stored");
                }
                Ok(rows) => {
                    debug!(customer_id = %customer.id, section = %section, rows, "section stored");
                    report.saved.push(section);
                }
                Err(err) => {
                    warn!(
                        customer_id = %customer.id,
                        period = %period,
                        section = %section,
                        error = %err,
                        "failed to persist section"
                    );
                    report.failed.push(SectionFailure {
                        section,
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }

    pub fn existing_sections(
        &self,
        period: &Period,
    ) -> Result<HashMap<CustomerId, SectionFlags>, StorageError> {
        self.store.existing_sections(period)
    }
}

fn section_rows(
    dataset: &GeneratedDataset,
    section: SectionKind,
    customer: &CustomerDescriptor,
    period: &Period,
) -> Result<Vec<(RecordKey, StoredRecord)>, StorageError> {
    let stored_at = chrono::Utc::now();
    let row = |discriminator: Option<&str>, payload: Value| {
        let key = RecordKey::new(period, &customer.id, discriminator);
        let record = StoredRecord {
            period: period.to_string(),
            customer_id: customer.id.to_string(),
            customer_name: customer.name.clone(),
            section,
            discriminator: discriminator.map(str::to_string),
            payload,
            stored_at,
        };
        (key, record)
    };
    let rows = match section {
        SectionKind::Summary => dataset
            .summary
            .iter()
            .map(|summary| Ok(row(None, to_payload(summary)?)))
            .collect::<Result<Vec<_>, StorageError>>()?,
        SectionKind::Detail => dataset
            .detail
            .iter()
            .flatten()
            .map(|account| Ok(row(Some(&account.account_id), to_payload(account)?)))
            .collect::<Result<Vec<_>, StorageError>>()?,
        SectionKind::ChannelA => dataset
            .channel_a
            .iter()
            .flatten()
            .map(|volume| Ok(row(Some(&volume.provider_code), to_payload(volume)?)))
            .collect::<Result<Vec<_>, StorageError>>()?,
        SectionKind::ChannelB => dataset
            .channel_b
            .iter()
            .flatten()
            .map(|volume| Ok(row(Some(&volume.provider_code), to_payload(volume)?)))
            .collect::<Result<Vec<_>, StorageError>>()?,
        SectionKind::Collateral => dataset
            .collateral
            .iter()
            .flatten()
            .map(|position| Ok(row(Some(&position.collateral_id), to_payload(position)?)))
            .collect::<Result<Vec<_>, StorageError>>()?,
    };
    Ok(rows)
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Encode(e.to_string()))
}
