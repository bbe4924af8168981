//! # Messages exchanged with the per-job agent.
//!
//! Outbound: [`ProcessManageSignal`], produced only by the controller's signal
//! enqueue and consumed through a [`SignalStream`](crate::SignalStream).
//!
//! Inbound: the report types below, handed to the controller's `report_*`
//! methods by the transport adapter. A report carrying a non-empty `uuid`
//! that differs from the in-flight exchange is dropped as stale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::RespCode;
use crate::fault::FaultRank;
use crate::strategy::Strategy;

/// Kind of outbound instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    StopTrain,
    GlobalFault,
    ChangeStrategy,
    KillMaster,
    KeepAlive,
}

impl SignalType {
    pub const fn as_str(self) -> &'static str {
        match self {
            SignalType::StopTrain => "stop_train",
            SignalType::GlobalFault => "global_fault",
            SignalType::ChangeStrategy => "change_strategy",
            SignalType::KillMaster => "kill_master",
            SignalType::KeepAlive => "keep_alive",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action names carried in [`ProcessManageSignal::actions`].
pub mod actions {
    pub const STOP_TRAIN: &str = "stop_train";
    pub const PAUSE_TRAIN: &str = "pause_train";
    pub const ON_GLOBAL_RANK: &str = "on_global_rank";
    pub const CHANGE_STRATEGY: &str = "change_strategy";
    pub const CONTINUE_TRAIN: &str = "continue_train";
    pub const RESTART_ALL_PROCESS: &str = "restart_all_process";
    pub const GRACE_EXIT: &str = "grace_exit";
    pub const SWITCH_NIC: &str = "switch_nic";
    pub const KILL_JOB: &str = "kill_job";
}

/// Outbound instruction to the agent. The agent must be idempotent per `uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessManageSignal {
    pub uuid: String,
    pub job_id: String,
    pub signal_type: SignalType,
    pub actions: Vec<String>,
    pub fault_ranks: Vec<FaultRank>,
    pub change_strategy: Option<Strategy>,
}

impl ProcessManageSignal {
    pub fn new(job_id: impl Into<String>, uuid: impl Into<String>, signal_type: SignalType) -> Self {
        Self {
            uuid: uuid.into(),
            job_id: job_id.into(),
            signal_type,
            actions: Vec::new(),
            fault_ranks: Vec::new(),
            change_strategy: None,
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.actions.push(action.to_string());
        self
    }

    pub fn with_faults(mut self, faults: Vec<FaultRank>) -> Self {
        self.fault_ranks = faults;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.change_strategy = Some(strategy);
        self
    }
}

/// The agent acknowledged a stop, pause, switch or continue instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopCompleteReport {
    pub uuid: String,
}

/// Strategies the agent can apply for the current fault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverStrategyReport {
    pub uuid: String,
    pub strategies: Vec<String>,
}

/// Outcome of a strategy the agent applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverStatusReport {
    pub uuid: String,
    pub strategy: Strategy,
    pub status_code: RespCode,
}

/// Scheduler verdict for rescheduled pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    Success,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_serializes_with_strategy() {
        let sig = ProcessManageSignal::new("job-1", "u-1", SignalType::ChangeStrategy)
            .with_action(actions::CHANGE_STRATEGY)
            .with_faults(vec![FaultRank::normal("2")])
            .with_strategy(Strategy::Dump);
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["change_strategy"], "dump");
        assert_eq!(json["signal_type"], "ChangeStrategy");
        assert_eq!(json["fault_ranks"][0]["fault_type"], "normal");
    }
}
