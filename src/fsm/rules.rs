use super::event::{FsmEvent, Handler};
use super::state::State;

/// `(source, event) → (handler, target)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub source: State,
    pub event: FsmEvent,
    pub handler: Handler,
    pub target: State,
}

impl Rule {
    /// Rule whose handler is the default for `target`.
    pub const fn new(source: State, event: FsmEvent, target: State) -> Self {
        Self {
            source,
            event,
            handler: Handler::entering(target),
            target,
        }
    }

    pub const fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = handler;
        self
    }
}

/// The recovery protocol.
pub fn default_rules() -> Vec<Rule> {
    use FsmEvent as E;
    use State as S;

    vec![
        Rule::new(S::Init, E::FaultOccur, S::NotifyWaitFaultFlushing),
        Rule::new(S::Init, E::SwitchNic, S::NotifyPauseTrain),
        // stop training and collect faults
        Rule::new(S::NotifyWaitFaultFlushing, E::NotifySuccess, S::NotifyStopTrain),
        Rule::new(S::NotifyStopTrain, E::NotifySuccess, S::WaitReportStopComplete),
        Rule::new(S::WaitReportStopComplete, E::ReceiveReport, S::WaitFaultFlushFinished),
        Rule::new(S::WaitReportStopComplete, E::ReportTimeout, S::NotifyKillJob),
        Rule::new(S::WaitFaultFlushFinished, E::FaultFlushFinished, S::NotifyGlobalFault),
        Rule::new(S::NotifyGlobalFault, E::NotifySuccess, S::WaitReportRecoverStrategy),
        Rule::new(S::WaitReportRecoverStrategy, E::ReceiveReport, S::NotifyDecidedStrategy),
        Rule::new(S::WaitReportRecoverStrategy, E::ReportTimeout, S::NotifyKillJob),
        // apply the decided strategy
        Rule::new(S::NotifyDecidedStrategy, E::RetryDecided, S::WaitReportStepRetryStatus),
        Rule::new(S::NotifyDecidedStrategy, E::RecoverDecided, S::WaitReportProcessRecoverStatus)
            .with_handler(Handler::DecideRecoverStrategy),
        Rule::new(S::NotifyDecidedStrategy, E::DumpDecided, S::WaitReportDumpStatus),
        Rule::new(S::NotifyDecidedStrategy, E::GraceExit, S::NotifyDump),
        Rule::new(S::NotifyDecidedStrategy, E::ExitDecided, S::NotifyKillJob),
        Rule::new(S::NotifyDump, E::NotifySuccess, S::WaitReportDumpStatus),
        Rule::new(S::WaitReportStepRetryStatus, E::ReceiveReport, S::CheckRecoverResult),
        Rule::new(S::WaitReportStepRetryStatus, E::ReportTimeout, S::KillPodForUnrecoverableRetry),
        Rule::new(S::WaitReportProcessRecoverStatus, E::ReceiveReport, S::CheckRecoverResult),
        Rule::new(S::WaitReportProcessRecoverStatus, E::ReportTimeout, S::NotifyKillJob),
        Rule::new(S::WaitReportDumpStatus, E::ReceiveReport, S::CheckRecoverResult),
        Rule::new(S::WaitReportDumpStatus, E::ReportTimeout, S::NotifyKillJob),
        // outcome
        Rule::new(S::CheckRecoverResult, E::RecoverSuccess, S::FaultClear),
        Rule::new(S::CheckRecoverResult, E::RecoverFail, S::NotifyDecidedStrategy),
        Rule::new(S::CheckRecoverResult, E::KillJob, S::NotifyKillJob),
        Rule::new(S::FaultClear, E::ScheduleRequired, S::ListenScheduleResult),
        Rule::new(S::FaultClear, E::FaultCleared, S::NotifyContinueTrain),
        Rule::new(S::FaultClear, E::Finish, S::Init),
        Rule::new(S::ListenScheduleResult, E::ScheduleSuccess, S::NotifyContinueTrain),
        Rule::new(S::ListenScheduleResult, E::ScheduleTimeout, S::NotifyKillJob),
        // unrecoverable retry: reschedule, then restart every process
        Rule::new(S::KillPodForUnrecoverableRetry, E::NotifySuccess, S::FaultRetry),
        Rule::new(S::FaultRetry, E::ScheduleSuccess, S::NotifyRestartAllProcess),
        Rule::new(S::FaultRetry, E::KillJob, S::NotifyKillJob),
        Rule::new(S::NotifyRestartAllProcess, E::NotifySuccess, S::WaitRestartAllProcess),
        Rule::new(S::WaitRestartAllProcess, E::ReceiveReport, S::WaitProcessRestartResult),
        Rule::new(S::WaitRestartAllProcess, E::ReportTimeout, S::NotifyKillJob),
        Rule::new(S::WaitProcessRestartResult, E::RecoverSuccess, S::FaultClear),
        Rule::new(S::WaitProcessRestartResult, E::RecoverFail, S::NotifyKillJob),
        // resume
        Rule::new(S::NotifyContinueTrain, E::NotifySuccess, S::WaitContinueTrain),
        Rule::new(S::WaitContinueTrain, E::Finish, S::Init),
        // NIC switch
        Rule::new(S::NotifyPauseTrain, E::NotifySuccess, S::WaitReportPauseComplete),
        Rule::new(S::WaitReportPauseComplete, E::ReceiveReport, S::NotifySwitchNic),
        Rule::new(S::WaitReportPauseComplete, E::ReportTimeout, S::NotifyKillJob),
        Rule::new(S::NotifySwitchNic, E::NotifySuccess, S::WaitSwitchNicFinished),
        Rule::new(S::WaitSwitchNicFinished, E::ReceiveReport, S::NotifyContinueTrain),
        Rule::new(S::WaitSwitchNicFinished, E::ReportTimeout, S::NotifyKillJob),
        // teardown
        Rule::new(S::NotifyKillJob, E::Finish, S::Init),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_state_has_an_exit() {
        let rules = default_rules();
        for state in State::ALL {
            assert!(
                rules.iter().any(|r| r.source == *state),
                "{state} has no outgoing rule"
            );
        }
    }

    #[test]
    fn test_every_state_but_init_is_reachable() {
        let targets: HashSet<State> = default_rules().iter().map(|r| r.target).collect();
        for state in State::ALL.iter().filter(|s| **s != State::Init) {
            assert!(targets.contains(state), "{state} is unreachable");
        }
    }

    #[test]
    fn test_no_duplicate_keys() {
        let rules = default_rules();
        let keys: HashSet<(State, FsmEvent)> = rules.iter().map(|r| (r.source, r.event)).collect();
        assert_eq!(keys.len(), rules.len());
    }

    #[test]
    fn test_finish_always_returns_to_init() {
        for r in default_rules().iter().filter(|r| r.event == FsmEvent::Finish) {
            assert_eq!(r.target, State::Init);
            assert_eq!(r.handler, Handler::Finish);
        }
    }
}
