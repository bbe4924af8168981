//! Fault reports: the per-rank model and the aggregation helpers.
//!
//! ## Contents
//! - [`FaultRank`], [`FaultType`] one faulty rank and its classification
//! - [`remove_duplicate_faults`], [`is_uce_fault`], [`fault_rank_ids_in_same_node`],
//!   [`fault_summary`] pure helpers
//! - [`label_fault_pods`] maps ranks to pods and labels them in the store
//!
//! The controller keeps two caches built from these: faults that need their
//! pods rescheduled ("normal") and uncorrectable faults that may still be
//! retried in place ("uce"). A rank never appears in both.

mod aggregate;
mod rank;

pub use aggregate::{
    fault_rank_ids_in_same_node, fault_summary, is_uce_fault, label_fault_pods,
    remove_duplicate_faults,
};
pub use rank::{FaultRank, FaultType};
