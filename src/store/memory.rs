use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{JobStore, SOFTWARE_FAULT_LABEL, SOFTWARE_FAULT_VALUE};
use crate::error::StoreError;
use crate::job::StoredResetInfo;

#[derive(Default)]
struct Inner {
    devices_per_node: u32,
    pod_labels: HashMap<String, BTreeMap<String, HashMap<String, String>>>,
    labels: HashMap<String, HashMap<String, String>>,
    annotations: HashMap<String, HashMap<String, String>>,
    pods_running: HashMap<String, bool>,
    reset_info: HashMap<String, StoredResetInfo>,
    fail_next: u32,
}

/// In-memory [`JobStore`].
///
/// Every job exists implicitly. Pods are reported running unless set otherwise.
/// [`MemoryJobStore::fail_next`] injects transient `ConfigMap` failures.
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    /// Creates an empty store with 8 devices per node.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                devices_per_node: 8,
                ..Inner::default()
            }),
        }
    }

    pub async fn set_devices_per_node(&self, n: u32) {
        self.inner.write().await.devices_per_node = n;
    }

    pub async fn set_pods_running(&self, job_id: &str, running: bool) {
        self.inner
            .write()
            .await
            .pods_running
            .insert(job_id.to_string(), running);
    }

    /// Makes the next `n` calls fail with a retryable error.
    pub async fn fail_next(&self, n: u32) {
        self.inner.write().await.fail_next = n;
    }

    /// Pod indexes of `job_id` carrying the software-fault label, ascending.
    pub async fn labeled_pods(&self, job_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let Some(pods) = inner.pod_labels.get(job_id) else {
            return Vec::new();
        };
        let mut out: Vec<String> = pods
            .iter()
            .filter(|(_, labels)| {
                labels.get(SOFTWARE_FAULT_LABEL).map(String::as_str) == Some(SOFTWARE_FAULT_VALUE)
            })
            .map(|(pod, _)| pod.clone())
            .collect();
        out.sort_by_key(|p| p.parse::<u64>().unwrap_or(u64::MAX));
        out
    }

    async fn check_fault(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(StoreError::ConfigMap {
                error: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn devices_per_node(&self, _job_id: &str) -> Result<u32, StoreError> {
        self.check_fault().await?;
        Ok(self.inner.read().await.devices_per_node)
    }

    async fn label_pod(
        &self,
        job_id: &str,
        pod_rank: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.check_fault().await?;
        self.inner
            .write()
            .await
            .pod_labels
            .entry(job_id.to_string())
            .or_default()
            .entry(pod_rank.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn pods_running(&self, job_id: &str) -> Result<bool, StoreError> {
        self.check_fault().await?;
        let inner = self.inner.read().await;
        Ok(inner.pods_running.get(job_id).copied().unwrap_or(true))
    }

    async fn label(&self, job_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        self.check_fault().await?;
        let inner = self.inner.read().await;
        Ok(inner.labels.get(job_id).and_then(|m| m.get(key)).cloned())
    }

    async fn set_label(&self, job_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_fault().await?;
        self.inner
            .write()
            .await
            .labels
            .entry(job_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn annotation(&self, job_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        self.check_fault().await?;
        let inner = self.inner.read().await;
        Ok(inner.annotations.get(job_id).and_then(|m| m.get(key)).cloned())
    }

    async fn set_annotation(
        &self,
        job_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.check_fault().await?;
        self.inner
            .write()
            .await
            .annotations
            .entry(job_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load_reset_info(
        &self,
        job_name: &str,
    ) -> Result<Option<StoredResetInfo>, StoreError> {
        self.check_fault().await?;
        let inner = self.inner.read().await;
        match inner.reset_info.get(job_name) {
            Some(record) => {
                record.verify(job_name)?;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn save_reset_info(
        &self,
        job_name: &str,
        record: &StoredResetInfo,
    ) -> Result<(), StoreError> {
        self.check_fault().await?;
        self.inner
            .write()
            .await
            .reset_info
            .insert(job_name.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ResetInfo, ResetOperation};

    #[tokio::test]
    async fn test_reset_info_roundtrip_verifies() {
        let store = MemoryJobStore::new();
        assert!(store.load_reset_info("train").await.unwrap().is_none());

        let info = ResetInfo::default().apply(&ResetOperation::NotifyFaultFlushing);
        let record = StoredResetInfo::seal("train", info).unwrap();
        store.save_reset_info("train", &record).await.unwrap();
        assert_eq!(store.load_reset_info("train").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryJobStore::new();
        store.fail_next(1).await;
        let err = store.devices_per_node("j").await.unwrap_err();
        assert!(matches!(err, StoreError::ConfigMap { .. }));
        assert_eq!(store.devices_per_node("j").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_labels_and_annotations_are_per_job() {
        let store = MemoryJobStore::new();
        store.set_annotation("a", "k", "v").await.unwrap();
        store.set_label("a", "l", "x").await.unwrap();
        assert_eq!(store.annotation("a", "k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.annotation("b", "k").await.unwrap(), None);
        assert_eq!(store.label("a", "l").await.unwrap().as_deref(), Some("x"));
        assert!(store.pods_running("a").await.unwrap());
    }
}
