use std::fmt;

use serde::{Deserialize, Serialize};

/// Fault classification reported for one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    /// Correctable or software-suspect fault; the rank is rescheduled.
    Normal,
    /// Uncorrectable hardware-class error (UCE); may be retried in place.
    Uncorrectable,
}

impl FaultType {
    /// Short name used in logs and fault summaries.
    pub const fn as_str(self) -> &'static str {
        match self {
            FaultType::Normal => "normal",
            FaultType::Uncorrectable => "uce",
        }
    }
}

/// One faulty rank. Two entries with the same `rank_id` describe the same fault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultRank {
    /// Global rank id, as reported by the agent (numeric in practice).
    pub rank_id: String,
    /// Fault classification.
    pub fault_type: FaultType,
}

impl FaultRank {
    /// Creates a fault entry.
    pub fn new(rank_id: impl Into<String>, fault_type: FaultType) -> Self {
        Self {
            rank_id: rank_id.into(),
            fault_type,
        }
    }

    /// Shorthand for a [`FaultType::Normal`] entry.
    pub fn normal(rank_id: impl Into<String>) -> Self {
        Self::new(rank_id, FaultType::Normal)
    }

    /// Shorthand for a [`FaultType::Uncorrectable`] entry.
    pub fn uce(rank_id: impl Into<String>) -> Self {
        Self::new(rank_id, FaultType::Uncorrectable)
    }

    #[inline]
    pub fn is_uce(&self) -> bool {
        matches!(self.fault_type, FaultType::Uncorrectable)
    }
}

impl fmt::Display for FaultRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rank_id, self.fault_type.as_str())
    }
}
