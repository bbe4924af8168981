//! # faultvisor
//!
//! **Faultvisor** is a per-job fault-recovery controller for distributed
//! training jobs.
//!
//! When ranks of a job fail, the job's [`EventController`] stops training,
//! collects late faults, announces the global fault to the job's agent,
//! negotiates a recovery [`Strategy`] (Retry > Recover > Dump > Exit), waits
//! for the outcome and either resumes training or kills the job. Every step is
//! a rule of a closed finite-state machine; every wait is bounded.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!          job labels                      fault reports / agent reports
//!              │                                         │
//!              ▼                                         ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Registry (one controller per job id)                                │
//! │  - Bus (broadcast events)                                            │
//! │  - SubscriberSet (LogWriter, StatusAnnotator, custom)                │
//! └──────┬──────────────────────────┬──────────────────────────┬─────────┘
//!        ▼                          ▼                          ▼
//! ┌───────────────┐          ┌───────────────┐          ┌───────────────┐
//! │EventController│          │EventController│          │EventController│
//! │  Fsm + loops  │          │  Fsm + loops  │          │  Fsm + loops  │
//! └──┬─────────┬──┘          └───────────────┘          └───────────────┘
//!    │         │
//!    │         └─► JobStore (labels, annotations, pods, reset info)   bounded retry
//!    ▼
//! SignalStream ──► forward_signals ──► AgentTransport ──► agent
//! ```
//!
//! ### Recovery cycle
//! ```text
//! Init ─FaultOccur─► NotifyWaitFaultFlushing ─► NotifyStopTrain ─► WaitReportStopComplete
//!   ─► WaitFaultFlushFinished ─► NotifyGlobalFault ─► WaitReportRecoverStrategy
//!   ─► NotifyDecidedStrategy ─┬─ Retry   ─► WaitReportStepRetryStatus ─┐
//!                             ├─ Recover ─► WaitReportProcessRecoverStatus ─┼─► CheckRecoverResult
//!                             ├─ Dump    ─► WaitReportDumpStatus ───────┘        │
//!                             └─ Exit    ─► NotifyKillJob ─Finish─► reset ─► Init │
//!   CheckRecoverResult ─success─► FaultClear ─► NotifyContinueTrain ─► WaitContinueTrain ─Finish─► reset
//!                      ─failure─► NotifyDecidedStrategy (one level down)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Controller**    | Per-job FSM, queues, mailboxes, resets.                      | [`EventController`], [`SignalStream`]       |
//! | **Registry**      | One controller per job, graceful shutdown.                   | [`Registry`]                                |
//! | **Strategies**    | Capability negotiation and priority order.                   | [`Strategy`], [`Negotiator`]                |
//! | **Adapters**      | Cluster resources and agent delivery.                        | [`JobStore`], [`AgentTransport`]            |
//! | **Subscriber API**| Hook into controller events (logging, status annotation).    | [`Subscribe`]                               |
//! | **Policies**      | Bounded retry with backoff and jitter.                       | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Errors**        | Typed errors mapped onto response codes.                     | [`RecoverError`], [`RespCode`]              |
//! | **Configuration** | Centralize queue, timeout and polling settings.              | [`Config`], [`RecoverConfig`]               |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use faultvisor::{
//!     Config, FaultRank, JobBaseInfo, LogWriter, MemoryJobStore, RecoverConfig, Registry,
//!     SignalType, Strategy, Subscribe,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         keep_alive_interval: Duration::ZERO,
//!         flush_window: Duration::ZERO,
//!         ..Config::default()
//!     };
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let registry = Registry::new(cfg, Arc::new(MemoryJobStore::new()), subs);
//!
//!     let rc = RecoverConfig {
//!         process_recover_enable: true,
//!         strategies: vec![Strategy::Dump],
//!         ..RecoverConfig::default()
//!     };
//!     let ctl = registry
//!         .observe(JobBaseInfo::new("job-1", "train", "pg-train", "default", rc))
//!         .await?;
//!
//!     ctl.report_fault(vec![FaultRank::normal("3")]).await?;
//!     let signal = ctl.signal_stream().await.recv().await.ok_or("no signal")?;
//!     assert_eq!(signal.signal_type, SignalType::StopTrain);
//!
//!     registry.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod code;
mod config;
mod controller;
mod error;
mod events;
mod fault;
mod fsm;
mod job;
mod policies;
mod registry;
mod signal;
mod strategy;
mod subscribers;
mod transport;

/// Resource store seam, in-memory implementation and label/annotation keys.
pub mod store;

// ---- Public re-exports ----

pub use code::RespCode;
pub use config::Config;
pub use controller::{ControllerSnapshot, EventController, SignalStream};
pub use error::{RecoverError, RuntimeError, StoreError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use fault::{
    FaultRank, FaultType, fault_rank_ids_in_same_node, fault_summary, is_uce_fault,
    label_fault_pods, remove_duplicate_faults,
};
pub use fsm::{Execute, Fired, Fsm, FsmEvent, Handler, Rule, State, Step, default_rules};
pub use job::{
    JobBaseInfo, RankEntry, RankStatus, RecoverConfig, ResetInfo, ResetOperation, StoredResetInfo,
};
pub use policies::{BackoffPolicy, Growth, JitterPolicy, RetryPolicy};
pub use registry::Registry;
pub use signal::{
    ProcessManageSignal, RecoverStatusReport, RecoverStrategyReport, ScheduleOutcome, SignalType,
    StopCompleteReport, actions,
};
pub use store::{JobStore, MemoryJobStore};
pub use strategy::{
    Negotiator, RecoverResult, Strategy, UnknownStrategy, parse_strategy_list,
    parse_strategy_names, sort_strategy_names,
};
pub use subscribers::{LogWriter, StatusAnnotator, Subscribe, SubscriberSet};
pub use transport::{AgentTransport, forward_signals};
