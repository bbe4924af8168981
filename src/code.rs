//! # Response codes shared by the controller, its handlers, and adapters.
//!
//! [`RespCode`] is a closed enumeration. The numeric ranges carry the retry
//! contract callers rely on:
//!
//! - `0`: success;
//! - `4xx`: ordering or client errors, **not** retryable;
//! - `5xx`: infrastructure errors, retryable by the caller.
//!
//! Use [`RespCode::is_retryable`] instead of comparing magnitudes.
//!
//! ## Example
//! ```rust
//! use faultvisor::RespCode;
//!
//! assert!(RespCode::SignalQueueBusy.is_retryable());
//! assert!(!RespCode::OrderMix.is_retryable());
//! assert_eq!(RespCode::ScheduleTimeout.as_u32(), 503);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome code attached to every handler step and every adapter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RespCode {
    /// Operation succeeded.
    Ok,

    // === 4xx: non-retryable ===
    /// Job has no registered controller.
    UnRegistry,
    /// Event arrived in a state that has no rule for it.
    OrderMix,
    /// Job does not exist in the resource store.
    JobNotExist,
    /// Process-level recovery is switched off for the job.
    ProcessRescheduleOff,
    /// Processes did not come back within the polling budget.
    ProcessNotReady,

    // === 5xx: retryable ===
    /// Internal invariant violated.
    ServerInnerError,
    /// Reading or writing a config-map style record failed.
    OperateConfigMapError,
    /// Reading or writing the job (pod group) resource failed.
    OperatePodGroupError,
    /// Scheduler did not place the job in time, or reported failure.
    ScheduleTimeout,
    /// Outbound signal queue stayed full for the whole enqueue budget.
    SignalQueueBusy,
    /// FSM event queue stayed full for the whole enqueue budget.
    EventQueueBusy,
    /// Remote agent did not report within the wait budget.
    WaitReportTimeout,
    /// External platform did not answer a confirmation in time.
    WaitPlatformResultTimeout,
    /// The incarnation was cancelled while the operation waited.
    ControllerCancelled,
}

impl RespCode {
    /// Numeric wire value.
    pub const fn as_u32(self) -> u32 {
        match self {
            RespCode::Ok => 0,
            RespCode::UnRegistry => 400,
            RespCode::OrderMix => 401,
            RespCode::JobNotExist => 402,
            RespCode::ProcessRescheduleOff => 403,
            RespCode::ProcessNotReady => 404,
            RespCode::ServerInnerError => 500,
            RespCode::OperateConfigMapError => 501,
            RespCode::OperatePodGroupError => 502,
            RespCode::ScheduleTimeout => 503,
            RespCode::SignalQueueBusy => 504,
            RespCode::EventQueueBusy => 505,
            RespCode::WaitReportTimeout => 506,
            RespCode::WaitPlatformResultTimeout => 507,
            RespCode::ControllerCancelled => 508,
        }
    }

    /// Returns `true` only for [`RespCode::Ok`].
    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, RespCode::Ok)
    }

    /// Whether a caller may retry the operation that produced this code.
    ///
    /// Every 5xx variant is retryable; success and 4xx variants are not.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            RespCode::ServerInnerError
                | RespCode::OperateConfigMapError
                | RespCode::OperatePodGroupError
                | RespCode::ScheduleTimeout
                | RespCode::SignalQueueBusy
                | RespCode::EventQueueBusy
                | RespCode::WaitReportTimeout
                | RespCode::WaitPlatformResultTimeout
                | RespCode::ControllerCancelled
        )
    }

    /// Short stable label (snake_case) for logs.
    pub const fn as_label(self) -> &'static str {
        match self {
            RespCode::Ok => "ok",
            RespCode::UnRegistry => "un_registry",
            RespCode::OrderMix => "order_mix",
            RespCode::JobNotExist => "job_not_exist",
            RespCode::ProcessRescheduleOff => "process_reschedule_off",
            RespCode::ProcessNotReady => "process_not_ready",
            RespCode::ServerInnerError => "server_inner_error",
            RespCode::OperateConfigMapError => "operate_config_map_error",
            RespCode::OperatePodGroupError => "operate_pod_group_error",
            RespCode::ScheduleTimeout => "schedule_timeout",
            RespCode::SignalQueueBusy => "signal_queue_busy",
            RespCode::EventQueueBusy => "event_queue_busy",
            RespCode::WaitReportTimeout => "wait_report_timeout",
            RespCode::WaitPlatformResultTimeout => "wait_platform_result_timeout",
            RespCode::ControllerCancelled => "controller_cancelled",
        }
    }
}

impl fmt::Display for RespCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_label(), self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RespCode; 15] = [
        RespCode::Ok,
        RespCode::UnRegistry,
        RespCode::OrderMix,
        RespCode::JobNotExist,
        RespCode::ProcessRescheduleOff,
        RespCode::ProcessNotReady,
        RespCode::ServerInnerError,
        RespCode::OperateConfigMapError,
        RespCode::OperatePodGroupError,
        RespCode::ScheduleTimeout,
        RespCode::SignalQueueBusy,
        RespCode::EventQueueBusy,
        RespCode::WaitReportTimeout,
        RespCode::WaitPlatformResultTimeout,
        RespCode::ControllerCancelled,
    ];

    #[test]
    fn test_retryable_matches_5xx_range() {
        for code in ALL {
            let in_5xx = (500..600).contains(&code.as_u32());
            assert_eq!(code.is_retryable(), in_5xx, "{code}");
        }
    }

    #[test]
    fn test_documented_values() {
        assert_eq!(RespCode::UnRegistry.as_u32(), 400);
        assert_eq!(RespCode::OrderMix.as_u32(), 401);
        assert_eq!(RespCode::JobNotExist.as_u32(), 402);
        assert_eq!(RespCode::OperateConfigMapError.as_u32(), 501);
        assert_eq!(RespCode::ScheduleTimeout.as_u32(), 503);
        assert_eq!(RespCode::SignalQueueBusy.as_u32(), 504);
    }
}
