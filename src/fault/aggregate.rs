//! # Fault aggregation.
//!
//! Pure helpers over [`FaultRank`] lists plus [`label_fault_pods`], the one
//! operation here that touches the resource store.
//!
//! ## Rules
//! - A rank id appears at most once after [`remove_duplicate_faults`]; on
//!   conflict `Uncorrectable` wins over `Normal`.
//! - [`is_uce_fault`] is vacuously `true` for an empty list.
//! - Node blocks are `[⌊r/d⌋·d, ⌊r/d⌋·d + d)` for `d` devices per node.
//! - [`label_fault_pods`] validates every rank before writing any label.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio_util::sync::CancellationToken;

use crate::{
    error::RecoverError,
    job::JobBaseInfo,
    policies::RetryPolicy,
    store::{self, JobStore},
};

use super::rank::{FaultRank, FaultType};

/// Collapses entries sharing a rank id into one, preferring `Uncorrectable`.
///
/// First-seen order of rank ids is preserved, which makes the function
/// idempotent: applying it twice equals applying it once.
pub fn remove_duplicate_faults(faults: &[FaultRank]) -> Vec<FaultRank> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(faults.len());
    let mut out: Vec<FaultRank> = Vec::with_capacity(faults.len());

    for fault in faults {
        match index.get(fault.rank_id.as_str()) {
            Some(&i) => {
                if fault.is_uce() {
                    out[i].fault_type = FaultType::Uncorrectable;
                }
            }
            None => {
                index.insert(fault.rank_id.as_str(), out.len());
                out.push(fault.clone());
            }
        }
    }
    out
}

/// `true` iff every fault in `faults` is uncorrectable.
pub fn is_uce_fault(faults: &[FaultRank]) -> bool {
    faults.iter().all(FaultRank::is_uce)
}

/// Expands each rank to every rank on the same physical node.
///
/// The result is deduplicated and sorted ascending. Rank ids that are not
/// numeric, or whose node block would pass `u64::MAX`, are skipped (and
/// logged); `devices_per_node == 0` yields nothing.
pub fn fault_rank_ids_in_same_node<S: AsRef<str>>(
    rank_ids: &[S],
    devices_per_node: u32,
) -> Vec<String> {
    if devices_per_node == 0 {
        tracing::warn!("devices per node is zero, cannot expand fault ranks");
        return Vec::new();
    }
    let d = u64::from(devices_per_node);
    let mut ranks: BTreeSet<u64> = BTreeSet::new();

    for raw in rank_ids {
        let raw = raw.as_ref();
        let Ok(rank) = raw.trim().parse::<u64>() else {
            tracing::warn!(rank = raw, "skipping non-numeric fault rank");
            continue;
        };
        let first = rank / d * d;
        let Some(end) = first.checked_add(d) else {
            tracing::warn!(rank = raw, "skipping fault rank past the last node block");
            continue;
        };
        ranks.extend(first..end);
    }
    ranks.into_iter().map(|r| r.to_string()).collect()
}

/// Renders `faults` as `rank:type` pairs for log lines.
pub fn fault_summary(faults: &[FaultRank]) -> String {
    if faults.is_empty() {
        return "-".to_string();
    }
    faults
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Maps faulty ranks to their pods and applies the software-fault label once per pod.
///
/// The pod index of a rank is `⌊rank / devices_per_node⌋`. Pods already present
/// in `labeled` are skipped; pods labeled by this call are added to it and
/// returned (ascending).
///
/// ### Errors
/// - `devices_per_node` is `0` → [`RecoverError::ZeroDevices`];
/// - a rank id is not numeric → [`RecoverError::InvalidRank`];
/// - the store keeps failing after the retry budget → [`RecoverError::Store`].
///
/// Both validation errors are raised before the first label is written.
pub async fn label_fault_pods(
    store: &dyn JobStore,
    job: &JobBaseInfo,
    faults: &[FaultRank],
    devices_per_node: u32,
    labeled: &mut HashSet<String>,
    retry: &RetryPolicy,
    token: &CancellationToken,
) -> Result<Vec<String>, RecoverError> {
    if devices_per_node == 0 {
        return Err(RecoverError::ZeroDevices {
            job: job.job_id.clone(),
        });
    }

    let mut pods: BTreeSet<u64> = BTreeSet::new();
    for fault in faults {
        let rank = fault
            .rank_id
            .trim()
            .parse::<u64>()
            .map_err(|_| RecoverError::InvalidRank {
                rank: fault.rank_id.clone(),
            })?;
        pods.insert(rank / u64::from(devices_per_node));
    }

    let mut newly = Vec::new();
    for pod in pods {
        let pod = pod.to_string();
        if labeled.contains(&pod) {
            continue;
        }
        retry
            .run(token, "label_pod", |_| {
                store.label_pod(
                    &job.job_id,
                    &pod,
                    store::SOFTWARE_FAULT_LABEL,
                    store::SOFTWARE_FAULT_VALUE,
                )
            })
            .await?;
        tracing::info!(job_id = %job.job_id, pod_rank = %pod, "labeled fault pod");
        labeled.insert(pod.clone());
        newly.push(pod);
    }
    Ok(newly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;

    fn job() -> JobBaseInfo {
        JobBaseInfo::new("job-1", "train", "pg-train", "default", Default::default())
    }

    #[test]
    fn test_dedup_prefers_uce() {
        let input = vec![
            FaultRank::normal("1"),
            FaultRank::uce("1"),
            FaultRank::normal("2"),
        ];
        let out = remove_duplicate_faults(&input);
        assert_eq!(out, vec![FaultRank::uce("1"), FaultRank::normal("2")]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let input = vec![
            FaultRank::normal("7"),
            FaultRank::uce("3"),
            FaultRank::normal("3"),
            FaultRank::normal("7"),
        ];
        let once = remove_duplicate_faults(&input);
        let twice = remove_duplicate_faults(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_uce_predicate() {
        assert!(is_uce_fault(&[FaultRank::uce("0"), FaultRank::uce("1")]));
        assert!(!is_uce_fault(&[FaultRank::uce("0"), FaultRank::normal("1")]));
        assert!(is_uce_fault(&[]));
    }

    #[test]
    fn test_same_node_expansion() {
        let out = fault_rank_ids_in_same_node(&["3", "10"], 8);
        let expected: Vec<String> = (0..16).map(|r: u32| r.to_string()).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_same_node_expansion_merges_shared_blocks() {
        let out = fault_rank_ids_in_same_node(&["1", "6", "x"], 4);
        assert_eq!(out, vec!["0", "1", "2", "3", "4", "5", "6", "7"]);
        assert!(fault_rank_ids_in_same_node(&["1"], 0).is_empty());
    }

    #[test]
    fn test_same_node_expansion_skips_last_block_overflow() {
        let max = u64::MAX.to_string();
        let out = fault_rank_ids_in_same_node(&[max.as_str(), "2"], 8);
        assert_eq!(out, vec!["0", "1", "2", "3", "4", "5", "6", "7"]);
    }

    #[test]
    fn test_fault_summary() {
        assert_eq!(fault_summary(&[]), "-");
        assert_eq!(
            fault_summary(&[FaultRank::normal("2"), FaultRank::uce("9")]),
            "2:normal,9:uce"
        );
    }

    #[tokio::test]
    async fn test_label_once_per_pod() {
        let store = MemoryJobStore::new();
        let job = job();
        let token = CancellationToken::new();
        let mut labeled = HashSet::new();

        let faults = vec![
            FaultRank::normal("1"),
            FaultRank::normal("3"),
            FaultRank::uce("9"),
        ];
        let first = label_fault_pods(
            &store,
            &job,
            &faults,
            8,
            &mut labeled,
            &RetryPolicy::immediate(1),
            &token,
        )
        .await
        .unwrap();
        assert_eq!(first, vec!["0", "1"]);

        let again = label_fault_pods(
            &store,
            &job,
            &faults,
            8,
            &mut labeled,
            &RetryPolicy::immediate(1),
            &token,
        )
        .await
        .unwrap();
        assert!(again.is_empty());
        assert_eq!(store.labeled_pods(&job.job_id).await, vec!["0", "1"]);
    }

    #[tokio::test]
    async fn test_label_uses_given_device_count() {
        let store = MemoryJobStore::new();
        store.set_devices_per_node(0).await;
        let job = job();
        let mut labeled = HashSet::new();

        let pods = label_fault_pods(
            &store,
            &job,
            &[FaultRank::normal("17")],
            4,
            &mut labeled,
            &RetryPolicy::immediate(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(pods, vec!["4"]);
    }

    #[tokio::test]
    async fn test_label_rejects_bad_input_without_partial_writes() {
        let store = MemoryJobStore::new();
        let job = job();
        let token = CancellationToken::new();
        let mut labeled = HashSet::new();

        let faults = vec![FaultRank::normal("1"), FaultRank::normal("rank-x")];
        let err = label_fault_pods(
            &store,
            &job,
            &faults,
            8,
            &mut labeled,
            &RetryPolicy::immediate(1),
            &token,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RecoverError::InvalidRank { .. }));
        assert!(store.labeled_pods(&job.job_id).await.is_empty());
        assert!(labeled.is_empty());

        let err = label_fault_pods(
            &store,
            &job,
            &[FaultRank::normal("1")],
            0,
            &mut labeled,
            &RetryPolicy::immediate(1),
            &token,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RecoverError::ZeroDevices { .. }));
    }
}
