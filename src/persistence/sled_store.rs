//! Sled-backed dataset store: one tree per section table.

use super::{DatasetStore, RecordKey, StoredRecord};
use crate::dataset::{SectionFlags, SectionKind};
use crate::error::StorageError;
use crate::types::{CustomerId, Period};
use sled::{Batch, Db, Tree};
use std::collections::HashMap;
use std::path::Path;

pub const TREE_SUMMARIES: &str = "financial_summaries";
pub const TREE_ACCOUNT_DETAILS: &str = "account_details";
pub const TREE_CHANNEL_A: &str = "channel_a_volumes";
pub const TREE_CHANNEL_B: &str = "channel_b_volumes";
pub const TREE_COLLATERAL: &str = "collateral_positions";

pub fn table_name(section: SectionKind) -> &'static str {
    match section {
        SectionKind::Summary => TREE_SUMMARIES,
        SectionKind::Detail => TREE_ACCOUNT_DETAILS,
        SectionKind::ChannelA => TREE_CHANNEL_A,
        SectionKind::ChannelB => TREE_CHANNEL_B,
        SectionKind::Collateral => TREE_COLLATERAL,
    }
}

/// Sled-based implementation of [`DatasetStore`]
#[derive(Clone)]
pub struct SledDatasetStore {
    db: Db,
    summaries: Tree,
    account_details: Tree,
    channel_a: Tree,
    channel_b: Tree,
    collateral: Tree,
}

impl SledDatasetStore {
    /// Open (or create) a sled database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Build on an already-open database, sharing it with other stores.
    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            summaries: db.open_tree(table_name(SectionKind::Summary))?,
            account_details: db.open_tree(table_name(SectionKind::Detail))?,
            channel_a: db.open_tree(table_name(SectionKind::ChannelA))?,
            channel_b: db.open_tree(table_name(SectionKind::ChannelB))?,
            collateral: db.open_tree(table_name(SectionKind::Collateral))?,
            db,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn tree(&self, section: SectionKind) -> &Tree {
        match section {
            SectionKind::Summary => &self.summaries,
            SectionKind::Detail => &self.account_details,
            SectionKind::ChannelA => &self.channel_a,
            SectionKind::ChannelB => &self.channel_b,
            SectionKind::Collateral => &self.collateral,
        }
    }
}

impl DatasetStore for SledDatasetStore {
    fn upsert_section(
        &self,
        section: SectionKind,
        rows: Vec<(RecordKey, StoredRecord)>,
    ) -> Result<(), StorageError> {
        let mut batch = Batch::default();
        for (key, record) in &rows {
            let value =
                serde_json::to_vec(record).map_err(|e| StorageError::Encode(e.to_string()))?;
            batch.insert(key.encode().as_bytes(), value);
        }
        let tree = self.tree(section);
        tree.apply_batch(batch)?;
        tree.flush()?;
        Ok(())
    }

    fn existing_sections(
        &self,
        period: &Period,
    ) -> Result<HashMap<CustomerId, SectionFlags>, StorageError> {
        let prefix = RecordKey::period_prefix(period);
        let mut existing: HashMap<CustomerId, SectionFlags> = HashMap::new();
        for section in SectionKind::ALL {
            for entry in self.tree(section).scan_prefix(prefix.as_bytes()) {
                let (key, _) = entry?;
                let key = String::from_utf8_lossy(&key);
                if let Some(customer_id) = RecordKey::customer_from_encoded(&key) {
                    existing.entry(customer_id).or_default().set(section);
                }
            }
        }
        Ok(existing)
    }

    fn load_section(
        &self,
        section: SectionKind,
        period: &Period,
        customer_id: &CustomerId,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let prefix = RecordKey::customer_prefix(period, customer_id);
        let mut out = Vec::new();
        for entry in self.tree(section).scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            let record: StoredRecord =
                serde_json::from_slice(&value).map_err(|e| StorageError::Decode(e.to_string()))?;
            out.push(record);
        }
        Ok(out)
    }
}
