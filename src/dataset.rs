//! Generated dataset model: one summary, one detail, two channel sections and collateral.
//!
//! Each section is independently optional. An absent section means "not generated",
//! never "generated but empty".

use crate::flags::GenerationFlags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminates the five dataset sections (and their store tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Detail,
    ChannelA,
    ChannelB,
    Collateral,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Summary,
        SectionKind::Detail,
        SectionKind::ChannelA,
        SectionKind::ChannelB,
        SectionKind::Collateral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Summary => "summary",
            SectionKind::Detail => "detail",
            SectionKind::ChannelA => "channel_a",
            SectionKind::ChannelB => "channel_b",
            SectionKind::Collateral => "collateral",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sections already have stored data for a customer in the active period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFlags {
    pub summary: bool,
    pub detail: bool,
    pub channel_a: bool,
    pub channel_b: bool,
    pub collateral: bool,
}

impl SectionFlags {
    pub fn set(&mut self, kind: SectionKind) {
        *self.slot(kind) = true;
    }

    pub fn has(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::Summary => self.summary,
            SectionKind::Detail => self.detail,
            SectionKind::ChannelA => self.channel_a,
            SectionKind::ChannelB => self.channel_b,
            SectionKind::Collateral => self.collateral,
        }
    }

    pub fn any(&self) -> bool {
        SectionKind::ALL.into_iter().any(|kind| self.has(kind))
    }

    pub fn merge(&mut self, other: SectionFlags) {
        for kind in SectionKind::ALL {
            if other.has(kind) {
                self.set(kind);
            }
        }
    }

    fn slot(&mut self, kind: SectionKind) -> &mut bool {
        match kind {
            SectionKind::Summary => &mut self.summary,
            SectionKind::Detail => &mut self.detail,
            SectionKind::ChannelA => &mut self.channel_a,
            SectionKind::ChannelB => &mut self.channel_b,
            SectionKind::Collateral => &mut self.collateral,
        }
    }
}

impl FromIterator<SectionKind> for SectionFlags {
    fn from_iter<I: IntoIterator<Item = SectionKind>>(iter: I) -> Self {
        let mut flags = SectionFlags::default();
        for kind in iter {
            flags.set(kind);
        }
        flags
    }
}

/// Headline financial figures for the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    #[serde(default = "default_currency")]
    pub currency: String,
    pub revenue: f64,
    #[serde(default)]
    pub operating_expenses: f64,
    pub net_income: f64,
    pub total_assets: f64,
    pub total_liabilities: f64,
    #[serde(default)]
    pub equity: f64,
}

/// Per-account balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    pub account_id: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub balance: f64,
    #[serde(default)]
    pub average_balance: f64,
}

/// Volumes processed through one payment provider on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderVolume {
    pub provider_code: String,
    #[serde(default)]
    pub transaction_count: u64,
    pub gross_volume: f64,
    #[serde(default)]
    pub fee_amount: f64,
}

/// One collateral position pledged by the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralPosition {
    pub collateral_id: String,
    #[serde(default)]
    pub collateral_type: String,
    pub market_value: f64,
    #[serde(default)]
    pub haircut_pct: f64,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Output of one generation call. Owned by the customer result until persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<FinancialSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Vec<AccountDetail>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_a: Option<Vec<ProviderVolume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_b: Option<Vec<ProviderVolume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collateral: Option<Vec<CollateralPosition>>,
}

impl GeneratedDataset {
    pub fn has(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::Summary => self.summary.is_some(),
            SectionKind::Detail => self.detail.is_some(),
            SectionKind::ChannelA => self.channel_a.is_some(),
            SectionKind::ChannelB => self.channel_b.is_some(),
            SectionKind::Collateral => self.collateral.is_some(),
        }
    }

    /// Sections present in this dataset, in canonical order.
    pub fn present_sections(&self) -> Vec<SectionKind> {
        SectionKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_sections().is_empty()
    }

    /// Drop any section the flags did not ask for.
    pub fn retain_requested(&mut self, flags: &GenerationFlags) {
        if !flags.generate_summary {
            self.summary = None;
        }
        if !flags.generate_detail {
            self.detail = None;
        }
        if !flags.generate_channel_a {
            self.channel_a = None;
        }
        if !flags.generate_channel_b {
            self.channel_b = None;
        }
        if !flags.generate_collateral {
            self.collateral = None;
        }
    }
}
