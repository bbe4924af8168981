//! Error types used by the recovery controller, its adapters and the registry.
//!
//! This module defines the error enums of the crate:
//!
//! - [`RecoverError`]: failures of controller operations and FSM handlers.
//! - [`StoreError`]: failures reported by a [`JobStore`](crate::JobStore).
//! - [`TransportError`]: failures reported by an [`AgentTransport`](crate::AgentTransport).
//! - [`RuntimeError`]: failures of the registry itself (shutdown overrun).
//!
//! Every error maps onto a [`RespCode`]; retryability is decided by the code's
//! 4xx/5xx class, never by ad-hoc matching at call sites.

use std::time::Duration;
use thiserror::Error;

use crate::code::RespCode;
use crate::fsm::{FsmEvent, State};

/// # Errors produced by the registry runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some controllers did not stop in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Job ids whose controllers were still running.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use faultvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors produced by the job resource store.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The job (or its pod group) does not exist.
    #[error("job {job} not found")]
    JobNotFound {
        /// Job id or job name that was looked up.
        job: String,
    },

    /// Reading or writing a config-map style record failed.
    #[error("config map operation failed: {error}")]
    ConfigMap {
        /// The underlying error message.
        error: String,
    },

    /// Reading or writing the job resource (labels, annotations, pods) failed.
    #[error("pod group operation failed: {error}")]
    PodGroup {
        /// The underlying error message.
        error: String,
    },

    /// A stored reset-info record failed its checksum or could not be encoded.
    #[error("reset info for {job} is corrupt: {error}")]
    Integrity {
        /// Job name the record is keyed by.
        job: String,
        /// What went wrong.
        error: String,
    },
}

impl StoreError {
    /// Response code reported for this failure.
    pub fn code(&self) -> RespCode {
        match self {
            StoreError::JobNotFound { .. } => RespCode::JobNotExist,
            StoreError::ConfigMap { .. } | StoreError::Integrity { .. } => {
                RespCode::OperateConfigMapError
            }
            StoreError::PodGroup { .. } => RespCode::OperatePodGroupError,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::JobNotFound { .. } => "store_job_not_found",
            StoreError::ConfigMap { .. } => "store_config_map",
            StoreError::PodGroup { .. } => "store_pod_group",
            StoreError::Integrity { .. } => "store_integrity",
        }
    }
}

/// # Errors produced by an agent transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The agent could not be reached this time.
    #[error("agent unavailable: {error}")]
    Unavailable {
        /// The underlying error message.
        error: String,
    },

    /// The agent stream is gone; retrying will not help.
    #[error("agent stream closed")]
    Closed,
}

impl TransportError {
    /// Response code reported for this failure.
    pub fn code(&self) -> RespCode {
        match self {
            TransportError::Unavailable { .. } => RespCode::ServerInnerError,
            TransportError::Closed => RespCode::UnRegistry,
        }
    }
}

/// # Errors produced by controller operations and FSM handlers.
///
/// A handler returning any of these (other than a timeout expressed as an
/// event) makes the event loop reset the controller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RecoverError {
    /// No rule exists for `event` in `state`.
    #[error("event {event} rejected in state {state}")]
    Rejected {
        /// State the controller was in.
        state: State,
        /// Event that had no rule.
        event: FsmEvent,
    },

    /// The FSM event queue stayed full for the whole enqueue budget.
    #[error("event queue busy after {budget:?}")]
    EventQueueBusy {
        /// The enqueue budget that elapsed.
        budget: Duration,
    },

    /// The outbound signal queue stayed full for the whole enqueue budget.
    #[error("signal queue busy after {budget:?}")]
    SignalQueueBusy {
        /// The enqueue budget that elapsed.
        budget: Duration,
    },

    /// The incarnation (or the whole controller) was cancelled while waiting.
    #[error("controller cancelled")]
    Cancelled,

    /// The job has no registered controller.
    #[error("job {job} is not registered")]
    UnRegistry {
        /// Job id that was looked up.
        job: String,
    },

    /// Process-level recovery is switched off for the job.
    #[error("process recovery is disabled for job {job}")]
    RecoverDisabled {
        /// Job id.
        job: String,
    },

    /// The device-per-node lookup returned zero.
    #[error("job {job} reports zero devices per node")]
    ZeroDevices {
        /// Job id.
        job: String,
    },

    /// A rank id could not be parsed as a number.
    #[error("rank id {rank:?} is not numeric")]
    InvalidRank {
        /// The offending rank id.
        rank: String,
    },

    /// A result check was reached with no recorded recovery outcome.
    #[error("job {job}: no recover result recorded in state {state}")]
    EmptyHistory {
        /// Job id.
        job: String,
        /// State the check ran in.
        state: State,
    },

    /// Resource-store failure that survived the retry budget.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Agent transport failure that survived the retry budget.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RecoverError {
    /// Response code reported for this failure.
    pub fn code(&self) -> RespCode {
        match self {
            RecoverError::Rejected { .. } => RespCode::OrderMix,
            RecoverError::EventQueueBusy { .. } => RespCode::EventQueueBusy,
            RecoverError::SignalQueueBusy { .. } => RespCode::SignalQueueBusy,
            RecoverError::Cancelled => RespCode::ControllerCancelled,
            RecoverError::UnRegistry { .. } => RespCode::UnRegistry,
            RecoverError::RecoverDisabled { .. } => RespCode::ProcessRescheduleOff,
            RecoverError::ZeroDevices { .. } => RespCode::OperatePodGroupError,
            RecoverError::InvalidRank { .. } | RecoverError::EmptyHistory { .. } => {
                RespCode::ServerInnerError
            }
            RecoverError::Store(e) => e.code(),
            RecoverError::Transport(e) => e.code(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use faultvisor::RecoverError;
    ///
    /// assert_eq!(RecoverError::Cancelled.as_label(), "recover_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RecoverError::Rejected { .. } => "recover_rejected",
            RecoverError::EventQueueBusy { .. } => "recover_event_queue_busy",
            RecoverError::SignalQueueBusy { .. } => "recover_signal_queue_busy",
            RecoverError::Cancelled => "recover_cancelled",
            RecoverError::UnRegistry { .. } => "recover_un_registry",
            RecoverError::RecoverDisabled { .. } => "recover_disabled",
            RecoverError::ZeroDevices { .. } => "recover_zero_devices",
            RecoverError::InvalidRank { .. } => "recover_invalid_rank",
            RecoverError::EmptyHistory { .. } => "recover_empty_history",
            RecoverError::Store(e) => e.as_label(),
            RecoverError::Transport(_) => "recover_transport",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        format!("{} [{}]", self, self.code())
    }

    /// Whether the caller may retry the operation that failed.
    ///
    /// Follows the code class: 5xx is retryable, 4xx is not.
    ///
    /// # Example
    /// ```
    /// use faultvisor::{RecoverError, StoreError};
    ///
    /// let busy = RecoverError::Store(StoreError::ConfigMap { error: "conflict".into() });
    /// assert!(busy.is_retryable());
    ///
    /// let missing = RecoverError::Store(StoreError::JobNotFound { job: "j".into() });
    /// assert!(!missing.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_to_order_mix() {
        let err = RecoverError::Rejected {
            state: State::Init,
            event: FsmEvent::NotifySuccess,
        };
        assert_eq!(err.code(), RespCode::OrderMix);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_queue_busy_is_retryable() {
        let err = RecoverError::SignalQueueBusy {
            budget: Duration::from_secs(1),
        };
        assert_eq!(err.code(), RespCode::SignalQueueBusy);
        assert!(err.is_retryable());
        assert!(err.as_message().contains("504"));
    }

    #[test]
    fn test_transport_codes() {
        let down: RecoverError = TransportError::Unavailable {
            error: "refused".into(),
        }
        .into();
        assert!(down.is_retryable());
        let closed: RecoverError = TransportError::Closed.into();
        assert!(!closed.is_retryable());
    }
}
