//! # Durable reset-info record.
//!
//! One [`ResetInfo`] per job, keyed by job name in the resource store. It is
//! never merged field by field: every change is a [`ResetOperation`] applied
//! to the prior record, producing a new one.
//!
//! | operation             | rank list              | flushing | retry_time |
//! |-----------------------|------------------------|----------|------------|
//! | `Clear`               | emptied                | `false`  | kept       |
//! | `NotifyFaultFlushing` | kept                   | `true`   | kept       |
//! | `NotifyFaultList`     | faults, `unhealthy`    | `false`  | `+1`       |
//! | `RestartAllProcess`   | every rank `restart`   | kept     | `+1`       |
//!
//! Every operation stamps `update_time` (unix seconds). The stored form,
//! [`StoredResetInfo`], pairs the record with a SHA-256 hex checksum of its
//! JSON encoding so external readers can detect torn writes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::fault::FaultRank;

/// Per-rank status in the durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankStatus {
    Unhealthy,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub rank_id: String,
    pub fault_status: RankStatus,
}

/// Durable per-job recovery state shared with the training side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInfo {
    pub rank_list: Vec<RankEntry>,
    pub update_time: i64,
    pub retry_time: u32,
    pub fault_flushing: bool,
    pub graceful_exit: bool,
}

/// The only ways a [`ResetInfo`] may change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOperation {
    Clear,
    NotifyFaultFlushing,
    NotifyFaultList {
        faults: Vec<FaultRank>,
        graceful_exit: bool,
    },
    RestartAllProcess,
}

impl ResetOperation {
    pub fn as_label(&self) -> &'static str {
        match self {
            ResetOperation::Clear => "clear",
            ResetOperation::NotifyFaultFlushing => "notify_fault_flushing",
            ResetOperation::NotifyFaultList { .. } => "notify_fault_list",
            ResetOperation::RestartAllProcess => "restart_all_process",
        }
    }
}

impl ResetInfo {
    /// Derives the next record from `self` by applying `op` at the current time.
    pub fn apply(&self, op: &ResetOperation) -> ResetInfo {
        self.apply_at(op, Utc::now().timestamp())
    }

    fn apply_at(&self, op: &ResetOperation, now: i64) -> ResetInfo {
        let mut next = self.clone();
        next.update_time = now;
        match op {
            ResetOperation::Clear => {
                next.rank_list.clear();
                next.fault_flushing = false;
            }
            ResetOperation::NotifyFaultFlushing => {
                next.fault_flushing = true;
            }
            ResetOperation::NotifyFaultList {
                faults,
                graceful_exit,
            } => {
                next.rank_list = faults
                    .iter()
                    .map(|f| RankEntry {
                        rank_id: f.rank_id.clone(),
                        fault_status: RankStatus::Unhealthy,
                    })
                    .collect();
                next.fault_flushing = false;
                next.retry_time = next.retry_time.saturating_add(1);
                next.graceful_exit = *graceful_exit;
            }
            ResetOperation::RestartAllProcess => {
                for entry in &mut next.rank_list {
                    entry.fault_status = RankStatus::Restart;
                }
                next.retry_time = next.retry_time.saturating_add(1);
            }
        }
        next
    }
}

/// A [`ResetInfo`] together with the checksum of its JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResetInfo {
    pub info: ResetInfo,
    pub checksum: String,
}

impl StoredResetInfo {
    /// Encodes `info` and computes its checksum.
    pub fn seal(job_name: &str, info: ResetInfo) -> Result<Self, StoreError> {
        let checksum = checksum(job_name, &info)?;
        Ok(Self { info, checksum })
    }

    /// Recomputes the checksum and compares it with the stored one.
    pub fn verify(&self, job_name: &str) -> Result<(), StoreError> {
        let actual = checksum(job_name, &self.info)?;
        if actual == self.checksum {
            Ok(())
        } else {
            Err(StoreError::Integrity {
                job: job_name.to_string(),
                error: format!("checksum mismatch: stored {} computed {actual}", self.checksum),
            })
        }
    }
}

fn checksum(job_name: &str, info: &ResetInfo) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(info).map_err(|e| StoreError::Integrity {
        job: job_name.to_string(),
        error: e.to_string(),
    })?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faults() -> Vec<FaultRank> {
        vec![FaultRank::normal("3"), FaultRank::uce("12")]
    }

    #[test]
    fn test_fault_list_marks_unhealthy_and_counts_retry() {
        let base = ResetInfo {
            fault_flushing: true,
            ..ResetInfo::default()
        };
        let next = base.apply_at(
            &ResetOperation::NotifyFaultList {
                faults: faults(),
                graceful_exit: true,
            },
            100,
        );
        assert_eq!(next.rank_list.len(), 2);
        assert!(next.rank_list.iter().all(|r| r.fault_status == RankStatus::Unhealthy));
        assert_eq!(next.retry_time, 1);
        assert!(!next.fault_flushing);
        assert!(next.graceful_exit);
        assert_eq!(next.update_time, 100);
        assert_eq!(base.retry_time, 0, "prior record is not mutated");
    }

    #[test]
    fn test_restart_all_and_clear() {
        let listed = ResetInfo::default().apply_at(
            &ResetOperation::NotifyFaultList {
                faults: faults(),
                graceful_exit: false,
            },
            1,
        );
        let restarted = listed.apply_at(&ResetOperation::RestartAllProcess, 2);
        assert!(restarted.rank_list.iter().all(|r| r.fault_status == RankStatus::Restart));
        assert_eq!(restarted.retry_time, 2);

        let flushing = restarted.apply_at(&ResetOperation::NotifyFaultFlushing, 3);
        assert!(flushing.fault_flushing);

        let cleared = flushing.apply_at(&ResetOperation::Clear, 4);
        assert!(cleared.rank_list.is_empty());
        assert!(!cleared.fault_flushing);
        assert_eq!(cleared.retry_time, 2);
    }

    #[test]
    fn test_checksum_follows_content() {
        let a = StoredResetInfo::seal("train", ResetInfo::default()).unwrap();
        let same = StoredResetInfo::seal("train", ResetInfo::default()).unwrap();
        assert_eq!(a.checksum, same.checksum);
        assert_eq!(a.checksum.len(), 64);

        let changed = ResetInfo::default().apply_at(&ResetOperation::NotifyFaultFlushing, 9);
        let b = StoredResetInfo::seal("train", changed).unwrap();
        assert_ne!(a.checksum, b.checksum);

        a.verify("train").unwrap();
        let mut torn = b.clone();
        torn.info.retry_time = 42;
        assert!(matches!(torn.verify("train"), Err(StoreError::Integrity { .. })));
    }
}
