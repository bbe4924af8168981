//! # Job resource store.
//!
//! The controller never owns cluster resources. It reaches them through the
//! [`JobStore`] trait: device counts, pod labels, job labels and annotations,
//! and the durable reset-info record. Callers wrap every call in a
//! [`RetryPolicy`](crate::RetryPolicy) and never hold a controller lock across one.
//!
//! [`MemoryJobStore`] is a complete in-process implementation used by tests
//! and by embedders that have no cluster behind them.
//!
//! ## Keys
//! The constants below are the label and annotation keys read or written by
//! the controller.

mod memory;

pub use memory::MemoryJobStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::job::StoredResetInfo;

/// Label: `on` enables process-level recovery.
pub const PROCESS_RECOVER_ENABLE: &str = "process-recover-enable";
/// Label: `platform` enables platform mode.
pub const PROCESS_RECOVER_MODE: &str = "process-recover-mode";
/// Label: `on` enables grace exit (dump before exit).
pub const GRACEFUL_EXIT: &str = "graceful-exit";
/// Label: comma-separated configured strategies.
pub const RECOVER_STRATEGY: &str = "recover-strategy";
/// Annotation: comma-separated strategies allowed by the platform.
pub const PLATFORM_RECOVER_STRATEGY: &str = "platform-recover-strategy";
/// Label: rescheduling switch of the job.
pub const POD_RESCHEDULING: &str = "pod-rescheduling";
/// Annotation: UCE ranks submitted to the platform for confirmation.
pub const CONFIRM_FAULT: &str = "confirm-fault";
/// Annotation: ranks the platform decided must be rescheduled.
pub const RESULT_FAULT: &str = "result-fault";
/// Annotation: `true` once the job's rank table is ready again.
pub const RANK_TABLE_READY: &str = "rank-table-ready";
/// Annotation: current recovery state of the job.
pub const RECOVER_STATUS: &str = "recover-status";

/// Pod label marking a pod that hosts a faulty rank.
pub const SOFTWARE_FAULT_LABEL: &str = "software-fault";
pub const SOFTWARE_FAULT_VALUE: &str = "true";

/// Values of [`POD_RESCHEDULING`].
pub const RESCHEDULING_ON: &str = "on";
pub const RESCHEDULING_PAUSE: &str = "pause";

/// Value of [`RANK_TABLE_READY`] once the table is usable.
pub const READY: &str = "true";

/// Access to the external job and pod resources.
///
/// Jobs are addressed by job id; the reset-info record by job name.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Number of devices (ranks) hosted by one node of the job.
    async fn devices_per_node(&self, job_id: &str) -> Result<u32, StoreError>;

    /// Sets `key=value` on the pod hosting pod index `pod_rank`.
    async fn label_pod(
        &self,
        job_id: &str,
        pod_rank: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Whether every pod of the job is running.
    async fn pods_running(&self, job_id: &str) -> Result<bool, StoreError>;

    async fn label(&self, job_id: &str, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_label(&self, job_id: &str, key: &str, value: &str) -> Result<(), StoreError>;

    async fn annotation(&self, job_id: &str, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_annotation(&self, job_id: &str, key: &str, value: &str)
    -> Result<(), StoreError>;

    /// Loads the reset-info record; `None` if it was never written.
    async fn load_reset_info(&self, job_name: &str)
    -> Result<Option<StoredResetInfo>, StoreError>;

    async fn save_reset_info(
        &self,
        job_name: &str,
        record: &StoredResetInfo,
    ) -> Result<(), StoreError>;
}
