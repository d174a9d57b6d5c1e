//! Per-customer results of a run.

use crate::dataset::{GeneratedDataset, SectionFlags};
use crate::persistence::{PersistenceReport, SectionFailure};
use crate::types::CustomerId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Pending,
    Processing,
    /// Generated and every section stored.
    Success,
    /// Generated, but at least one section failed to store.
    PartialSuccess,
    Error,
    /// Already has stored data for the period (queue not yet run over it).
    Existing,
    /// Passed over by the loop because stored data exists and overwrite is off.
    Skipped,
}

impl CustomerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Error => "error",
            Self::Existing => "existing",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One customer's entry in the result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResult {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_name: String,
    pub status: CustomerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<GeneratedDataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        rename = "existingSectionFlags",
        skip_serializing_if = "Option::is_none"
    )]
    pub existing_sections: Option<SectionFlags>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persistence_failures: Vec<SectionFailure>,
}

impl CustomerResult {
    pub fn new(customer_id: CustomerId, status: CustomerStatus) -> Self {
        Self {
            customer_id,
            customer_name: String::new(),
            status,
            dataset: None,
            error: None,
            existing_sections: None,
            persistence_failures: Vec::new(),
        }
    }

    pub(crate) fn with_name(mut self, name: &str) -> Self {
        self.customer_name = name.to_string();
        self
    }

    pub(crate) fn mark_failed(&mut self, message: String) {
        self.status = CustomerStatus::Error;
        self.error = Some(message);
        self.dataset = None;
        self.persistence_failures.clear();
    }

    /// Record a generated dataset together with how its persistence went.
    pub(crate) fn mark_generated(&mut self, dataset: GeneratedDataset, report: &PersistenceReport) {
        self.status = if report.is_complete() {
            CustomerStatus::Success
        } else {
            CustomerStatus::PartialSuccess
        };
        self.error = None;
        self.persistence_failures = report.failed.clone();
        let mut sections = self.existing_sections.unwrap_or_default();
        sections.merge(report.saved_flags());
        self.existing_sections = sections.any().then_some(sections);
        self.dataset = Some(dataset);
    }
}

/// Count of results per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub success: usize,
    pub partial_success: usize,
    pub error: usize,
    pub existing: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn tally(results: &[CustomerResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.status {
                CustomerStatus::Pending => counts.pending += 1,
                CustomerStatus::Processing => counts.processing += 1,
                CustomerStatus::Success => counts.success += 1,
                CustomerStatus::PartialSuccess => counts.partial_success += 1,
                CustomerStatus::Error => counts.error += 1,
                CustomerStatus::Existing => counts.existing += 1,
                CustomerStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Results the loop has finished with in this run.
    pub fn finished(&self) -> usize {
        self.success + self.partial_success + self.error + self.skipped
    }
}
