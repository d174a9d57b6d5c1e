//! Deterministic per-customer generation decisions.
//!
//! Every decision is derived from a BLAKE3 digest of the customer identifier, so the
//! same customer gets the same sections requested in every run and every process.
//! The thresholds are nested: a customer under a lower threshold is also under every
//! higher one.

use crate::dataset::SectionKind;
use crate::types::CustomerId;
use serde::{Deserialize, Serialize};

pub const SUMMARY_THRESHOLD: u8 = 90;
pub const DETAIL_THRESHOLD: u8 = 50;
pub const COLLATERAL_THRESHOLD: u8 = 40;
pub const CHANNEL_A_THRESHOLD: u8 = 33;
pub const CHANNEL_B_THRESHOLD: u8 = 25;

/// Which optional dataset sections to request for one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFlags {
    pub generate_summary: bool,
    pub generate_detail: bool,
    pub generate_channel_a: bool,
    pub generate_channel_b: bool,
    pub generate_collateral: bool,
}

impl GenerationFlags {
    pub fn requests(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::Summary => self.generate_summary,
            SectionKind::Detail => self.generate_detail,
            SectionKind::ChannelA => self.generate_channel_a,
            SectionKind::ChannelB => self.generate_channel_b,
            SectionKind::Collateral => self.generate_collateral,
        }
    }

    pub fn requested_sections(&self) -> Vec<SectionKind> {
        SectionKind::ALL
            .into_iter()
            .filter(|kind| self.requests(*kind))
            .collect()
    }
}

/// Reduce a customer id to a stable bucket in `[0, 100)`.
pub fn bucket(customer_id: &CustomerId) -> u8 {
    let digest = blake3::hash(customer_id.as_str().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % 100) as u8
}

/// Derive the generation flags for a customer. Pure: depends only on the id.
pub fn compute_flags(customer_id: &CustomerId) -> GenerationFlags {
    flags_for_bucket(bucket(customer_id))
}

/// Apply the nested thresholds to a bucket value.
pub fn flags_for_bucket(r: u8) -> GenerationFlags {
    GenerationFlags {
        generate_summary: r < SUMMARY_THRESHOLD,
        generate_detail: r < DETAIL_THRESHOLD,
        generate_channel_a: r < CHANNEL_A_THRESHOLD,
        generate_channel_b: r < CHANNEL_B_THRESHOLD,
        generate_collateral: r < COLLATERAL_THRESHOLD,
    }
}
