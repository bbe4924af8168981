use std::collections::HashSet;

use serde::Serialize;

use crate::fault::{FaultRank, FaultType, remove_duplicate_faults};
use crate::fsm::State;
use crate::signal::ScheduleOutcome;
use crate::strategy::{RecoverResult, Strategy};

/// Mutable per-cycle state of one job. Cleared as a whole by a reset.
///
/// ## Rules
/// - A rank id is in at most one of `normal_faults` / `uce_faults`.
/// - Once `folded`, new faults go straight to `normal_faults`.
#[derive(Debug, Default)]
pub(crate) struct JobState {
    pub(crate) uuid: String,
    pub(crate) normal_faults: Vec<FaultRank>,
    pub(crate) uce_faults: Vec<FaultRank>,
    pub(crate) recover_results: Vec<RecoverResult>,
    pub(crate) agent_strategies: Vec<Strategy>,
    pub(crate) platform_strategies: Vec<Strategy>,
    pub(crate) labeled_pods: HashSet<String>,
    pub(crate) schedule_latch: Option<ScheduleOutcome>,
    pub(crate) folded: bool,
    pub(crate) pending_nic: Vec<String>,
    pub(crate) restarted_all: bool,
}

impl JobState {
    /// Merges a fault report into the two caches.
    pub(crate) fn merge_faults(&mut self, faults: &[FaultRank]) {
        for fault in remove_duplicate_faults(faults) {
            if let Some(known) = self
                .normal_faults
                .iter_mut()
                .find(|f| f.rank_id == fault.rank_id)
            {
                if fault.is_uce() {
                    known.fault_type = FaultType::Uncorrectable;
                }
                continue;
            }
            if self.uce_faults.iter().any(|f| f.rank_id == fault.rank_id) {
                continue;
            }
            if self.folded || !fault.is_uce() {
                self.normal_faults.push(fault);
            } else {
                self.uce_faults.push(fault);
            }
        }
    }

    /// Moves every UCE fault into the normal cache; they now need rescheduling.
    pub(crate) fn fold_uce(&mut self) {
        self.normal_faults.append(&mut self.uce_faults);
        self.folded = true;
    }

    /// Moves the listed ranks from the UCE cache into the normal cache.
    pub(crate) fn promote(&mut self, rank_ids: &[String]) {
        let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.uce_faults)
            .into_iter()
            .partition(|f| rank_ids.contains(&f.rank_id));
        self.uce_faults = kept;
        self.normal_faults.extend(moved);
    }

    #[inline]
    pub(crate) fn has_normal_fault(&self) -> bool {
        !self.normal_faults.is_empty()
    }

    /// Both caches, normal first.
    pub(crate) fn all_faults(&self) -> Vec<FaultRank> {
        self.normal_faults
            .iter()
            .chain(self.uce_faults.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn last_strategy(&self) -> Option<Strategy> {
        self.recover_results.last().map(|r| r.strategy)
    }

    pub(crate) fn tried(&self, s: Strategy) -> bool {
        self.recover_results.iter().any(|r| r.strategy == s)
    }

    pub(crate) fn clear_faults(&mut self) {
        self.normal_faults.clear();
        self.uce_faults.clear();
        self.folded = false;
    }
}

/// Point-in-time view of a controller, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub job_id: String,
    pub state: State,
    pub generation: u64,
    pub uuid: String,
    pub normal_faults: Vec<FaultRank>,
    pub uce_faults: Vec<FaultRank>,
    pub recover_results: Vec<RecoverResult>,
    pub agent_strategies: Vec<Strategy>,
    pub platform_strategies: Vec<Strategy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_caches_disjoint() {
        let mut st = JobState::default();
        st.merge_faults(&[FaultRank::normal("1"), FaultRank::uce("2"), FaultRank::normal("1")]);
        assert_eq!(st.normal_faults, vec![FaultRank::normal("1")]);
        assert_eq!(st.uce_faults, vec![FaultRank::uce("2")]);

        st.merge_faults(&[FaultRank::uce("1"), FaultRank::normal("2")]);
        assert_eq!(st.normal_faults, vec![FaultRank::uce("1")]);
        assert_eq!(st.uce_faults, vec![FaultRank::uce("2")]);
        assert!(st.has_normal_fault());
    }

    #[test]
    fn test_fold_routes_later_faults_to_normal() {
        let mut st = JobState::default();
        st.merge_faults(&[FaultRank::uce("3")]);
        assert!(!st.has_normal_fault());

        st.fold_uce();
        assert!(st.uce_faults.is_empty());
        st.merge_faults(&[FaultRank::uce("5")]);
        assert_eq!(st.normal_faults, vec![FaultRank::uce("3"), FaultRank::uce("5")]);
    }

    #[test]
    fn test_promote_moves_only_listed() {
        let mut st = JobState::default();
        st.merge_faults(&[FaultRank::uce("1"), FaultRank::uce("2")]);
        st.promote(&["2".to_string()]);
        assert_eq!(st.uce_faults, vec![FaultRank::uce("1")]);
        assert_eq!(st.normal_faults, vec![FaultRank::uce("2")]);
    }
}
