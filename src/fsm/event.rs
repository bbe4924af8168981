use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::{State, named_enum};

named_enum! {
    /// Input of the recovery FSM.
    pub enum FsmEvent {
        FaultOccur,
        SwitchNic,
        NotifySuccess,
        ReceiveReport,
        ReportTimeout,
        FaultFlushFinished,
        RetryDecided,
        RecoverDecided,
        DumpDecided,
        GraceExit,
        ExitDecided,
        RecoverSuccess,
        RecoverFail,
        KillJob,
        ScheduleRequired,
        FaultCleared,
        ScheduleSuccess,
        ScheduleTimeout,
        Finish,
    }
}

named_enum! {
    /// Work executed when a rule fires.
    ///
    /// Almost every handler is named after the state it enters. The two
    /// exceptions are `DecideRecoverStrategy` (entering
    /// `WaitReportProcessRecoverStatus`) and `Finish` (entering `Init`).
    pub enum Handler {
        NotifyWaitFaultFlushing,
        NotifyStopTrain,
        WaitReportStopComplete,
        WaitFaultFlushFinished,
        NotifyGlobalFault,
        WaitReportRecoverStrategy,
        NotifyDecidedStrategy,
        WaitReportStepRetryStatus,
        WaitReportProcessRecoverStatus,
        DecideRecoverStrategy,
        WaitReportDumpStatus,
        WaitProcessRestartResult,
        FaultClear,
        FaultRetry,
        CheckRecoverResult,
        ListenScheduleResult,
        NotifyRestartAllProcess,
        WaitRestartAllProcess,
        NotifyKillJob,
        KillPodForUnrecoverableRetry,
        NotifyDump,
        WaitContinueTrain,
        NotifySwitchNic,
        WaitSwitchNicFinished,
        NotifyPauseTrain,
        WaitReportPauseComplete,
        NotifyContinueTrain,
        Finish,
    }
}

impl Handler {
    /// Default handler for a rule whose target is `state`.
    pub const fn entering(state: State) -> Handler {
        match state {
            State::Init => Handler::Finish,
            State::NotifyWaitFaultFlushing => Handler::NotifyWaitFaultFlushing,
            State::NotifyStopTrain => Handler::NotifyStopTrain,
            State::WaitReportStopComplete => Handler::WaitReportStopComplete,
            State::WaitFaultFlushFinished => Handler::WaitFaultFlushFinished,
            State::NotifyGlobalFault => Handler::NotifyGlobalFault,
            State::WaitReportRecoverStrategy => Handler::WaitReportRecoverStrategy,
            State::NotifyDecidedStrategy => Handler::NotifyDecidedStrategy,
            State::WaitReportStepRetryStatus => Handler::WaitReportStepRetryStatus,
            State::WaitReportProcessRecoverStatus => Handler::WaitReportProcessRecoverStatus,
            State::WaitReportDumpStatus => Handler::WaitReportDumpStatus,
            State::WaitProcessRestartResult => Handler::WaitProcessRestartResult,
            State::FaultClear => Handler::FaultClear,
            State::FaultRetry => Handler::FaultRetry,
            State::CheckRecoverResult => Handler::CheckRecoverResult,
            State::ListenScheduleResult => Handler::ListenScheduleResult,
            State::NotifyRestartAllProcess => Handler::NotifyRestartAllProcess,
            State::WaitRestartAllProcess => Handler::WaitRestartAllProcess,
            State::NotifyKillJob => Handler::NotifyKillJob,
            State::KillPodForUnrecoverableRetry => Handler::KillPodForUnrecoverableRetry,
            State::NotifyDump => Handler::NotifyDump,
            State::WaitContinueTrain => Handler::WaitContinueTrain,
            State::NotifySwitchNic => Handler::NotifySwitchNic,
            State::WaitSwitchNicFinished => Handler::WaitSwitchNicFinished,
            State::NotifyPauseTrain => Handler::NotifyPauseTrain,
            State::WaitReportPauseComplete => Handler::WaitReportPauseComplete,
            State::NotifyContinueTrain => Handler::NotifyContinueTrain,
        }
    }
}
