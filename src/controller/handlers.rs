//! FSM handlers.
//!
//! [`Cycle`] binds the controller to one incarnation and implements
//! [`Execute`]. Every handler follows the same shape:
//!
//! ```text
//! snapshot job state (short lock) ─► store / queue calls (no lock) ─► write back (short lock) ─► Fired
//! ```
//!
//! Waiting handlers select over {report, cancellation, timeout}; a timeout is
//! an event (`ReportTimeout` with a code), a cancellation is an error.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::core::EventController;
use super::incarnation::Incarnation;
use super::mailbox::Mailbox;
use crate::{
    code::RespCode,
    config::Config,
    error::RecoverError,
    fault::{FaultRank, fault_rank_ids_in_same_node, is_uce_fault, label_fault_pods},
    fsm::{Execute, Fired, FsmEvent, Handler, State},
    job::ResetOperation,
    signal::{ProcessManageSignal, ScheduleOutcome, SignalType, actions},
    store::{
        CONFIRM_FAULT, PLATFORM_RECOVER_STRATEGY, POD_RESCHEDULING, RANK_TABLE_READY, READY,
        RESCHEDULING_ON, RESCHEDULING_PAUSE, RESULT_FAULT,
    },
    strategy::{Negotiator, RecoverResult, Strategy, parse_strategy_list, parse_strategy_names},
};

pub(crate) struct Cycle<'a> {
    ctl: &'a EventController,
    inc: &'a Incarnation,
}

fn after_report<T>(got: Option<T>) -> Fired {
    match got {
        Some(_) => Fired::then(FsmEvent::ReceiveReport),
        None => Fired::with_code(FsmEvent::ReportTimeout, RespCode::WaitReportTimeout),
    }
}

fn after_schedule(outcome: ScheduleOutcome) -> Fired {
    match outcome {
        ScheduleOutcome::Success => Fired::then(FsmEvent::ScheduleSuccess),
        ScheduleOutcome::Failed => {
            Fired::with_code(FsmEvent::ScheduleTimeout, RespCode::ScheduleTimeout)
        }
    }
}

fn nic_faults(ranks: &[String]) -> Vec<FaultRank> {
    ranks.iter().map(|r| FaultRank::normal(r.as_str())).collect()
}

impl<'a> Cycle<'a> {
    pub(crate) fn new(ctl: &'a EventController, inc: &'a Incarnation) -> Self {
        Self { ctl, inc }
    }

    fn cfg(&self) -> &Config {
        self.ctl.config()
    }

    fn token(&self) -> &CancellationToken {
        &self.inc.token
    }

    fn job_id(&self) -> &str {
        &self.ctl.job().job_id
    }

    // ---- helpers ----

    async fn send(
        &self,
        signal_type: SignalType,
        action: &str,
        faults: Vec<FaultRank>,
        strategy: Option<Strategy>,
    ) -> Result<(), RecoverError> {
        let uuid = self.ctl.job_state().lock().await.uuid.clone();
        let mut signal = ProcessManageSignal::new(self.job_id(), uuid, signal_type)
            .with_action(action)
            .with_faults(faults);
        if let Some(s) = strategy {
            signal = signal.with_strategy(s);
        }
        self.ctl.signal_enqueue(self.inc, signal).await
    }

    async fn persist(&self, op: ResetOperation) -> Result<(), RecoverError> {
        self.ctl.update_reset_info(self.token(), op).await
    }

    async fn mint_uuid(&self) {
        self.ctl.job_state().lock().await.uuid = Uuid::new_v4().to_string();
    }

    async fn all_faults(&self) -> Vec<FaultRank> {
        self.ctl.job_state().lock().await.all_faults()
    }

    async fn record(&self, strategy: Strategy, code: RespCode) {
        self.ctl
            .job_state()
            .lock()
            .await
            .recover_results
            .push(RecoverResult::new(strategy, code));
    }

    /// Waits for a report; `Ok(None)` once the report timeout elapses.
    async fn await_report<T: Send>(&self, mailbox: &Mailbox<T>) -> Result<Option<T>, RecoverError> {
        self.await_report_until(mailbox, Instant::now() + self.cfg().report_timeout)
            .await
    }

    async fn await_report_until<T: Send>(
        &self,
        mailbox: &Mailbox<T>,
        deadline: Instant,
    ) -> Result<Option<T>, RecoverError> {
        tokio::select! {
            biased;
            _ = self.token().cancelled() => Err(RecoverError::Cancelled),
            v = mailbox.take() => Ok(Some(v)),
            _ = sleep_until(deadline) => Ok(None),
        }
    }

    async fn pause(&self, d: Duration) -> Result<(), RecoverError> {
        tokio::select! {
            biased;
            _ = self.token().cancelled() => Err(RecoverError::Cancelled),
            _ = sleep(d) => Ok(()),
        }
    }

    async fn annotation(&self, key: &str) -> Result<Option<String>, RecoverError> {
        let (store, job_id) = (self.ctl.store(), self.job_id());
        self.cfg()
            .store_retry
            .run(self.token(), "annotation", |_| store.annotation(job_id, key))
            .await
    }

    async fn set_annotation(&self, key: &str, value: &str) -> Result<(), RecoverError> {
        let (store, job_id) = (self.ctl.store(), self.job_id());
        self.cfg()
            .store_retry
            .run(self.token(), "set_annotation", |_| {
                store.set_annotation(job_id, key, value)
            })
            .await
    }

    async fn set_label(&self, key: &str, value: &str) -> Result<(), RecoverError> {
        let (store, job_id) = (self.ctl.store(), self.job_id());
        self.cfg()
            .store_retry
            .run(self.token(), "set_label", |_| store.set_label(job_id, key, value))
            .await
    }

    async fn rank_table_ready(&self) -> Result<bool, RecoverError> {
        Ok(self
            .annotation(RANK_TABLE_READY)
            .await?
            .is_some_and(|v| v.trim() == READY))
    }

    /// Polls `key` until it is set or the platform budget is spent.
    async fn poll_annotation(&self, key: &str) -> Result<Option<String>, RecoverError> {
        for _ in 0..self.cfg().platform_poll_attempts {
            if let Some(v) = self.annotation(key).await? {
                return Ok(Some(v));
            }
            self.pause(self.cfg().poll_interval).await?;
        }
        Ok(None)
    }

    /// Labels the pods of the normal faults and builds the announced fault list:
    /// every rank on a faulty node, then the remaining UCE faults.
    async fn announce_list(&self) -> Result<Vec<FaultRank>, RecoverError> {
        let (normal, uce, mut labeled) = {
            let st = self.ctl.job_state().lock().await;
            (
                st.normal_faults.clone(),
                st.uce_faults.clone(),
                st.labeled_pods.clone(),
            )
        };
        if normal.is_empty() {
            return Ok(uce);
        }

        let (store, job) = (self.ctl.store(), self.ctl.job());
        let retry = &self.cfg().store_retry;
        let devices = retry
            .run(self.token(), "devices_per_node", |_| {
                store.devices_per_node(&job.job_id)
            })
            .await?;
        let newly =
            label_fault_pods(store, job, &normal, devices, &mut labeled, retry, self.token())
                .await?;
        if !newly.is_empty() {
            tracing::info!(job_id = self.job_id(), pods = ?newly, "fault pods labeled");
        }
        self.ctl.job_state().lock().await.labeled_pods = labeled;

        let ids: Vec<&str> = normal.iter().map(|f| f.rank_id.as_str()).collect();
        let mut list: Vec<FaultRank> = fault_rank_ids_in_same_node(&ids, devices)
            .into_iter()
            .map(|id| {
                let known = normal.iter().chain(&uce).find(|f| f.rank_id == id).cloned();
                known.unwrap_or_else(|| FaultRank::normal(id))
            })
            .collect();
        for fault in uce {
            if !list.iter().any(|f| f.rank_id == fault.rank_id) {
                list.push(fault);
            }
        }
        Ok(list)
    }

    /// Asks the platform which UCE ranks must be rescheduled.
    ///
    /// Confirmed ranks move to the normal cache; no answer folds every UCE fault.
    async fn confirm_with_platform(&self, uce: &[FaultRank]) -> Result<(), RecoverError> {
        let ids = uce
            .iter()
            .map(|f| f.rank_id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.set_annotation(CONFIRM_FAULT, &ids).await?;

        match self.poll_annotation(RESULT_FAULT).await? {
            Some(result) => {
                let confirmed: Vec<String> = result
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                tracing::info!(job_id = self.job_id(), ?confirmed, "platform confirmed faults");
                self.ctl.job_state().lock().await.promote(&confirmed);
            }
            None => {
                tracing::warn!(
                    job_id = self.job_id(),
                    code = %RespCode::WaitPlatformResultTimeout,
                    "no platform answer, rescheduling every fault"
                );
                self.ctl.job_state().lock().await.fold_uce();
            }
        }
        Ok(())
    }

    // ---- fault cycle ----

    async fn notify_wait_fault_flushing(&self) -> Result<Fired, RecoverError> {
        self.persist(ResetOperation::NotifyFaultFlushing).await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn notify_stop_train(&self) -> Result<Fired, RecoverError> {
        self.mint_uuid().await;
        let faults = self.all_faults().await;
        self.inc.stop_complete.try_take();
        self.send(SignalType::StopTrain, actions::STOP_TRAIN, faults, None)
            .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn wait_stop_complete(&self) -> Result<Fired, RecoverError> {
        let got = self.await_report(&self.inc.stop_complete).await?;
        Ok(after_report(got))
    }

    async fn wait_fault_flush_finished(&self) -> Result<Fired, RecoverError> {
        if let Some(window) = self.cfg().flush() {
            self.pause(window).await?;
        }
        Ok(Fired::then(FsmEvent::FaultFlushFinished))
    }

    async fn notify_global_fault(&self) -> Result<Fired, RecoverError> {
        let rc = &self.ctl.job().recover_config;
        let (retry_eligible, all, uce) = {
            let mut st = self.ctl.job_state().lock().await;
            let eligible = rc.allows(Strategy::Retry) && !st.tried(Strategy::Retry);
            if !eligible {
                st.fold_uce();
            }
            (eligible, st.all_faults(), st.uce_faults.clone())
        };
        if retry_eligible && rc.platform_mode && !uce.is_empty() && is_uce_fault(&all) {
            self.confirm_with_platform(&uce).await?;
        }

        let faults = self.announce_list().await?;
        self.persist(ResetOperation::NotifyFaultList {
            faults: faults.clone(),
            graceful_exit: rc.grace_exit,
        })
        .await?;
        self.inc.recover_strategy.try_take();
        self.send(SignalType::GlobalFault, actions::ON_GLOBAL_RANK, faults, None)
            .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn wait_report_recover_strategy(&self) -> Result<Fired, RecoverError> {
        let Some(report) = self.await_report(&self.inc.recover_strategy).await? else {
            return Ok(after_report(None::<()>));
        };
        let agent = parse_strategy_names(&report.strategies);
        let platform = if self.ctl.job().recover_config.platform_mode {
            match self.poll_annotation(PLATFORM_RECOVER_STRATEGY).await? {
                Some(raw) => parse_strategy_list(&raw),
                None => {
                    tracing::warn!(job_id = self.job_id(), "platform strategies not published");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        tracing::info!(job_id = self.job_id(), ?agent, ?platform, "strategies reported");

        let mut st = self.ctl.job_state().lock().await;
        st.agent_strategies = agent;
        st.platform_strategies = platform;
        Ok(Fired::then(FsmEvent::ReceiveReport))
    }

    async fn notify_decided_strategy(&self) -> Result<Fired, RecoverError> {
        let rc = &self.ctl.job().recover_config;
        let (choice, grace_exit, faults) = {
            let st = self.ctl.job_state().lock().await;
            let choice = Negotiator::new(rc, &st.agent_strategies, &st.platform_strategies)
                .choose(&st.recover_results, st.has_normal_fault());
            let grace_exit = choice == Strategy::Exit
                && rc.grace_exit
                && st.agent_strategies.contains(&Strategy::Dump)
                && !st.tried(Strategy::Dump);
            (choice, grace_exit, st.all_faults())
        };
        tracing::info!(job_id = self.job_id(), strategy = %choice, grace_exit, "strategy decided");

        let next = match choice {
            _ if grace_exit => return Ok(Fired::then(FsmEvent::GraceExit)),
            Strategy::Exit => return Ok(Fired::then(FsmEvent::ExitDecided)),
            Strategy::Retry => FsmEvent::RetryDecided,
            Strategy::Recover => FsmEvent::RecoverDecided,
            Strategy::Dump => FsmEvent::DumpDecided,
        };
        self.inc.recover_status.try_take();
        self.send(
            SignalType::ChangeStrategy,
            actions::CHANGE_STRATEGY,
            faults,
            Some(choice),
        )
        .await?;
        Ok(Fired::then(next))
    }

    async fn wait_report_status(&self, expected: Strategy) -> Result<Fired, RecoverError> {
        // One budget for the whole wait; reports for another strategy don't extend it.
        let deadline = Instant::now() + self.cfg().report_timeout;
        loop {
            let Some(report) = self
                .await_report_until(&self.inc.recover_status, deadline)
                .await?
            else {
                return Ok(after_report(None::<()>));
            };
            if report.strategy != expected {
                tracing::warn!(
                    job_id = self.job_id(),
                    expected = %expected,
                    reported = %report.strategy,
                    "status reported for another strategy, ignored"
                );
                continue;
            }
            self.record(expected, report.status_code).await;
            return Ok(Fired::then(FsmEvent::ReceiveReport));
        }
    }

    /// Waits for the Recover outcome while watching the scheduler.
    async fn decide_recover_strategy(&self) -> Result<Fired, RecoverError> {
        let deadline = Instant::now() + self.cfg().report_timeout;
        loop {
            tokio::select! {
                biased;
                _ = self.token().cancelled() => return Err(RecoverError::Cancelled),
                outcome = self.inc.schedule_result.take() => match outcome {
                    ScheduleOutcome::Failed => {
                        tracing::warn!(job_id = self.job_id(), "rescheduling failed");
                        return Ok(Fired::with_code(FsmEvent::ReportTimeout, RespCode::ScheduleTimeout));
                    }
                    ScheduleOutcome::Success => {
                        self.ctl.job_state().lock().await.schedule_latch = Some(ScheduleOutcome::Success);
                        self.persist(ResetOperation::Clear).await?;
                    }
                },
                report = self.inc.recover_status.take() => {
                    self.record(Strategy::Recover, report.status_code).await;
                    return Ok(Fired::then(FsmEvent::ReceiveReport));
                }
                _ = sleep_until(deadline) => {
                    return Ok(Fired::with_code(FsmEvent::ReportTimeout, RespCode::WaitReportTimeout));
                }
            }
        }
    }

    async fn check_recover_result(&self) -> Result<Fired, RecoverError> {
        let last = self.ctl.job_state().lock().await.recover_results.last().copied();
        let Some(last) = last else {
            return Err(RecoverError::EmptyHistory {
                job: self.job_id().to_string(),
                state: State::CheckRecoverResult,
            });
        };
        Ok(if last.strategy == Strategy::Dump {
            Fired::with_code(FsmEvent::KillJob, last.code)
        } else if last.is_success() {
            Fired::then(FsmEvent::RecoverSuccess)
        } else {
            Fired::with_code(FsmEvent::RecoverFail, last.code)
        })
    }

    async fn fault_clear(&self) -> Result<Fired, RecoverError> {
        let (restarted_all, last) = {
            let mut st = self.ctl.job_state().lock().await;
            st.clear_faults();
            (st.restarted_all, st.last_strategy())
        };
        self.persist(ResetOperation::Clear).await?;
        Ok(Fired::then(if restarted_all {
            FsmEvent::Finish
        } else if last == Some(Strategy::Recover) {
            FsmEvent::ScheduleRequired
        } else {
            FsmEvent::FaultCleared
        }))
    }

    async fn listen_schedule_result(&self) -> Result<Fired, RecoverError> {
        if let Some(latched) = self.ctl.job_state().lock().await.schedule_latch {
            return Ok(after_schedule(latched));
        }
        for _ in 0..self.cfg().schedule_poll_attempts {
            if let Some(outcome) = self.inc.schedule_result.try_take() {
                return Ok(after_schedule(outcome));
            }
            if self.rank_table_ready().await? {
                return Ok(Fired::then(FsmEvent::ScheduleSuccess));
            }
            self.pause(self.cfg().poll_interval).await?;
        }
        Ok(Fired::with_code(FsmEvent::ScheduleTimeout, RespCode::ScheduleTimeout))
    }

    // ---- retry fallback ----

    async fn kill_pod_for_unrecoverable_retry(&self) -> Result<Fired, RecoverError> {
        {
            let mut st = self.ctl.job_state().lock().await;
            st.recover_results
                .push(RecoverResult::new(Strategy::Retry, RespCode::WaitReportTimeout));
            st.fold_uce();
        }
        let faults = self.announce_list().await?;
        self.persist(ResetOperation::NotifyFaultList {
            faults,
            graceful_exit: self.ctl.job().recover_config.grace_exit,
        })
        .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn wait_pods_running(&self) -> Result<bool, RecoverError> {
        self.set_label(POD_RESCHEDULING, RESCHEDULING_PAUSE).await?;
        let (store, job_id) = (self.ctl.store(), self.job_id());
        for _ in 0..self.cfg().pods_running_poll_attempts {
            let running = self
                .cfg()
                .store_retry
                .run(self.token(), "pods_running", |_| store.pods_running(job_id))
                .await?;
            if running {
                return Ok(true);
            }
            self.pause(self.cfg().poll_interval).await?;
        }
        Ok(false)
    }

    async fn fault_retry(&self) -> Result<Fired, RecoverError> {
        let outcome = self.wait_pods_running().await;
        if let Err(err) = self.set_label(POD_RESCHEDULING, RESCHEDULING_ON).await {
            tracing::warn!(job_id = self.job_id(), error = %err, "rescheduling not re-enabled");
        }
        match outcome {
            Ok(true) => Ok(Fired::then(FsmEvent::ScheduleSuccess)),
            Ok(false) => Ok(Fired::with_code(FsmEvent::KillJob, RespCode::ProcessNotReady)),
            Err(RecoverError::Cancelled) => Err(RecoverError::Cancelled),
            Err(err) => {
                tracing::warn!(job_id = self.job_id(), error = %err, "pods did not come back");
                Ok(Fired::with_code(FsmEvent::KillJob, err.code()))
            }
        }
    }

    async fn notify_restart_all_process(&self) -> Result<Fired, RecoverError> {
        self.persist(ResetOperation::RestartAllProcess).await?;
        let faults = {
            let mut st = self.ctl.job_state().lock().await;
            st.restarted_all = true;
            st.all_faults()
        };
        self.inc.stop_complete.try_take();
        self.send(SignalType::GlobalFault, actions::RESTART_ALL_PROCESS, faults, None)
            .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn wait_process_restart_result(&self) -> Result<Fired, RecoverError> {
        for _ in 0..self.cfg().restart_poll_attempts {
            if self.rank_table_ready().await? {
                return Ok(Fired::then(FsmEvent::RecoverSuccess));
            }
            self.pause(self.cfg().poll_interval).await?;
        }
        Ok(Fired::with_code(FsmEvent::RecoverFail, RespCode::ProcessNotReady))
    }

    // ---- exit paths ----

    async fn notify_dump(&self) -> Result<Fired, RecoverError> {
        let faults = self.all_faults().await;
        self.inc.recover_status.try_take();
        self.send(
            SignalType::ChangeStrategy,
            actions::GRACE_EXIT,
            faults,
            Some(Strategy::Dump),
        )
        .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn notify_kill_job(&self) -> Result<Fired, RecoverError> {
        let faults = self.all_faults().await;
        if let Err(err) = self
            .send(SignalType::KillMaster, actions::KILL_JOB, faults, None)
            .await
        {
            tracing::error!(job_id = self.job_id(), error = %err, "kill signal not enqueued");
        }
        Ok(Fired::then(FsmEvent::Finish))
    }

    // ---- resume / NIC switch ----

    async fn notify_continue_train(&self) -> Result<Fired, RecoverError> {
        self.inc.stop_complete.try_take();
        self.send(
            SignalType::ChangeStrategy,
            actions::CONTINUE_TRAIN,
            Vec::new(),
            None,
        )
        .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn wait_continue_train(&self) -> Result<Fired, RecoverError> {
        Ok(match self.await_report(&self.inc.stop_complete).await? {
            Some(_) => Fired::then(FsmEvent::Finish),
            None => Fired::with_code(FsmEvent::Finish, RespCode::WaitReportTimeout),
        })
    }

    async fn notify_pause_train(&self) -> Result<Fired, RecoverError> {
        self.mint_uuid().await;
        let ranks = self.ctl.job_state().lock().await.pending_nic.clone();
        self.inc.stop_complete.try_take();
        self.send(
            SignalType::StopTrain,
            actions::PAUSE_TRAIN,
            nic_faults(&ranks),
            None,
        )
        .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }

    async fn notify_switch_nic(&self) -> Result<Fired, RecoverError> {
        let ranks = self.ctl.job_state().lock().await.pending_nic.clone();
        self.inc.stop_complete.try_take();
        self.send(
            SignalType::GlobalFault,
            actions::SWITCH_NIC,
            nic_faults(&ranks),
            None,
        )
        .await?;
        Ok(Fired::then(FsmEvent::NotifySuccess))
    }
}

#[async_trait]
impl<'a> Execute for Cycle<'a> {
    async fn execute(&self, handler: Handler) -> Result<Fired, RecoverError> {
        match handler {
            Handler::NotifyWaitFaultFlushing => self.notify_wait_fault_flushing().await,
            Handler::NotifyStopTrain => self.notify_stop_train().await,
            Handler::WaitReportStopComplete
            | Handler::WaitRestartAllProcess
            | Handler::WaitReportPauseComplete
            | Handler::WaitSwitchNicFinished => self.wait_stop_complete().await,
            Handler::WaitFaultFlushFinished => self.wait_fault_flush_finished().await,
            Handler::NotifyGlobalFault => self.notify_global_fault().await,
            Handler::WaitReportRecoverStrategy => self.wait_report_recover_strategy().await,
            Handler::NotifyDecidedStrategy => self.notify_decided_strategy().await,
            Handler::WaitReportStepRetryStatus => self.wait_report_status(Strategy::Retry).await,
            Handler::WaitReportDumpStatus => self.wait_report_status(Strategy::Dump).await,
            Handler::DecideRecoverStrategy | Handler::WaitReportProcessRecoverStatus => {
                self.decide_recover_strategy().await
            }
            Handler::CheckRecoverResult => self.check_recover_result().await,
            Handler::FaultClear => self.fault_clear().await,
            Handler::ListenScheduleResult => self.listen_schedule_result().await,
            Handler::KillPodForUnrecoverableRetry => self.kill_pod_for_unrecoverable_retry().await,
            Handler::FaultRetry => self.fault_retry().await,
            Handler::NotifyRestartAllProcess => self.notify_restart_all_process().await,
            Handler::WaitProcessRestartResult => self.wait_process_restart_result().await,
            Handler::NotifyDump => self.notify_dump().await,
            Handler::NotifyKillJob => self.notify_kill_job().await,
            Handler::NotifyContinueTrain => self.notify_continue_train().await,
            Handler::WaitContinueTrain => self.wait_continue_train().await,
            Handler::NotifyPauseTrain => self.notify_pause_train().await,
            Handler::NotifySwitchNic => self.notify_switch_nic().await,
            Handler::Finish => Ok(Fired::done()),
        }
    }
}
