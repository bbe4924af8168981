use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, Notify, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;

use super::handlers::Cycle;
use super::incarnation::{Incarnation, SignalStream};
use super::mailbox::Mailbox;
use super::state::{ControllerSnapshot, JobState};
use crate::{
    code::RespCode,
    config::Config,
    error::{RecoverError, StoreError},
    events::{Bus, Event, EventKind},
    fault::{FaultRank, fault_summary},
    fsm::{Fsm, FsmEvent, State},
    job::{JobBaseInfo, ResetOperation, StoredResetInfo},
    signal::{
        ProcessManageSignal, RecoverStatusReport, RecoverStrategyReport, ScheduleOutcome,
        SignalType, StopCompleteReport,
    },
    store::JobStore,
    strategy::{Negotiator, Strategy},
};

/// Recovery controller of one job.
///
/// Owns the job's FSM, its cached faults and strategy history, and the current
/// [`Incarnation`]: the event and signal queues, the report mailboxes and the
/// cancellation token shared by the two loops (event loop, keep-alive loop).
///
/// ## Rules
/// - One event loop per incarnation is the only caller of [`Fsm::trigger`].
/// - A reset holds the write lock on the current incarnation for its whole
///   duration; inbound reports wait for it and land in the new incarnation.
/// - The old incarnation's loops are joined before the new ones start.
/// - Resets requested from inside a loop retire the incarnation at once, then
///   are spawned and carry the generation they target; a request for an
///   already replaced generation is a no-op.
/// - Faults and events only enter a live incarnation. Callers that find the
///   current one retiring wait for its replacement.
/// - The FSM enters a state before that state's handler runs.
/// - No lock is held across a store call or a queue send.
pub struct EventController {
    job: JobBaseInfo,
    cfg: Config,
    store: Arc<dyn JobStore>,
    bus: Bus,
    fsm: Fsm,
    root: CancellationToken,
    current: RwLock<Arc<Incarnation>>,
    state: Mutex<JobState>,
    loops: StdMutex<Vec<JoinHandle<()>>>,
    replaced: Notify,
}

impl EventController {
    /// Creates the controller and starts the first incarnation's loops.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(job: JobBaseInfo, cfg: Config, store: Arc<dyn JobStore>, bus: Bus) -> Arc<Self> {
        let root = CancellationToken::new();
        let first = Arc::new(Incarnation::new(0, root.child_token(), &cfg));
        let ctl = Arc::new(Self {
            job,
            cfg,
            store,
            bus,
            fsm: Fsm::default(),
            root,
            current: RwLock::new(Arc::clone(&first)),
            state: Mutex::new(JobState::default()),
            loops: StdMutex::new(Vec::new()),
            replaced: Notify::new(),
        });
        ctl.spawn_loops(&first);
        ctl.bus
            .publish(Event::new(EventKind::ControllerCreated).with_job(ctl.job.job_id.as_str()));
        ctl
    }

    pub fn job(&self) -> &JobBaseInfo {
        &self.job
    }

    pub(crate) fn config(&self) -> &Config {
        &self.cfg
    }

    pub(crate) fn store(&self) -> &dyn JobStore {
        &*self.store
    }

    pub(crate) fn job_state(&self) -> &Mutex<JobState> {
        &self.state
    }

    /// Current FSM state.
    #[inline]
    pub fn state(&self) -> State {
        self.fsm.state()
    }

    /// Receiver observing every FSM state change.
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.fsm.subscribe()
    }

    /// Transitions since the last reset.
    pub fn path_graph(&self) -> String {
        self.fsm.path_graph()
    }

    /// Token cancelled when the controller stops; survives resets.
    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.root
    }

    pub fn is_stopped(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Generation of the current incarnation; starts at `0`, `+1` per reset.
    pub async fn generation(&self) -> u64 {
        self.current.read().await.generation
    }

    /// Outbound signals of the current incarnation.
    pub async fn signal_stream(&self) -> SignalStream {
        self.current.read().await.signal_stream()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let generation = self.generation().await;
        let st = self.state.lock().await;
        ControllerSnapshot {
            job_id: self.job.job_id.clone(),
            state: self.fsm.state(),
            generation,
            uuid: st.uuid.clone(),
            normal_faults: st.normal_faults.clone(),
            uce_faults: st.uce_faults.clone(),
            recover_results: st.recover_results.clone(),
            agent_strategies: st.agent_strategies.clone(),
            platform_strategies: st.platform_strategies.clone(),
        }
    }

    /// Strategy that would be chosen now, given the recorded history.
    pub async fn choose_strategy(&self) -> Strategy {
        let st = self.state.lock().await;
        Negotiator::new(
            &self.job.recover_config,
            &st.agent_strategies,
            &st.platform_strategies,
        )
        .choose(&st.recover_results, st.has_normal_fault())
    }

    // ---- inbound ----

    /// Enqueues `event` after checking it against the current state.
    ///
    /// When the current incarnation is retiring, waits for its replacement and
    /// checks `event` there.
    ///
    /// ### Errors
    /// - no rule for `event` in the current state → [`RecoverError::Rejected`];
    /// - the queue stays full for the enqueue budget → [`RecoverError::EventQueueBusy`]
    ///   (a reset is scheduled);
    /// - no live incarnation within the enqueue and join budgets → [`RecoverError::EventQueueBusy`];
    /// - the controller is stopped → [`RecoverError::Cancelled`].
    pub async fn add_event(self: &Arc<Self>, event: FsmEvent) -> Result<(), RecoverError> {
        loop {
            let inc = self.live().await?;
            if self.submit(&inc, event).await? {
                return Ok(());
            }
        }
    }

    /// Current incarnation once it accepts input.
    async fn live(&self) -> Result<Arc<Incarnation>, RecoverError> {
        let budget = self.cfg.enqueue_timeout + self.cfg.join_timeout;
        let deadline = Instant::now() + budget;
        loop {
            let replaced = self.replaced.notified();
            tokio::pin!(replaced);
            replaced.as_mut().enable();
            if self.is_stopped() {
                return Err(RecoverError::Cancelled);
            }
            let inc = Arc::clone(&*self.current.read().await);
            if inc.is_live() {
                return Ok(inc);
            }
            if timeout_at(deadline, replaced).await.is_err() {
                tracing::warn!(job_id = %self.job.job_id, ?budget, "no live incarnation in time");
                return Err(RecoverError::EventQueueBusy { budget });
            }
        }
    }

    /// Checks `event` and enqueues it into `inc`; `Ok(false)` when `inc`
    /// retired before the check.
    async fn submit(self: &Arc<Self>, inc: &Incarnation, event: FsmEvent) -> Result<bool, RecoverError> {
        // State first: an incarnation is retired before its FSM goes back to Init.
        let state = self.fsm.state();
        if !inc.is_live() {
            return Ok(false);
        }
        if !self.fsm.rule_check(state, event) {
            tracing::warn!(job_id = %self.job.job_id, %state, %event, "event rejected");
            self.bus.publish(
                Event::new(EventKind::EventRejected)
                    .with_job(self.job.job_id.as_str())
                    .with_state(state)
                    .with_fsm_event(event)
                    .with_code(RespCode::OrderMix),
            );
            return Err(RecoverError::Rejected { state, event });
        }
        self.enqueue_event(inc, event).await.map(|()| true)
    }

    async fn enqueue_event(
        self: &Arc<Self>,
        inc: &Incarnation,
        event: FsmEvent,
    ) -> Result<(), RecoverError> {
        let budget = self.cfg.enqueue_timeout;
        match timeout(budget, inc.events_tx.send((event, RespCode::Ok))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RecoverError::Cancelled),
            Err(_) => {
                tracing::error!(job_id = %self.job.job_id, %event, ?budget, "event queue busy, resetting");
                self.schedule_reset(inc);
                Err(RecoverError::EventQueueBusy { budget })
            }
        }
    }

    /// Merges a fault report; starts a recovery cycle when the job is idle.
    ///
    /// Faults reported while a cycle is in flight join that cycle. Faults
    /// reported while a finished cycle is being reset go to the next
    /// incarnation.
    pub async fn report_fault(self: &Arc<Self>, faults: Vec<FaultRank>) -> Result<(), RecoverError> {
        tracing::info!(job_id = %self.job.job_id, faults = %fault_summary(&faults), "fault reported");
        loop {
            let inc = self.live().await?;
            {
                let mut st = self.state.lock().await;
                if !inc.is_live() {
                    continue;
                }
                st.merge_faults(&faults);
            }
            let state = self.fsm.state();
            if !inc.is_live() {
                continue;
            }
            if state != State::Init {
                return Ok(());
            }
            if self.submit(&inc, FsmEvent::FaultOccur).await? {
                return Ok(());
            }
        }
    }

    /// Starts a NIC switch cycle for `ranks`.
    pub async fn request_switch_nic(self: &Arc<Self>, ranks: Vec<String>) -> Result<(), RecoverError> {
        loop {
            let inc = self.live().await?;
            {
                let mut st = self.state.lock().await;
                if !inc.is_live() {
                    continue;
                }
                st.pending_nic = ranks.clone();
            }
            if self.submit(&inc, FsmEvent::SwitchNic).await? {
                return Ok(());
            }
        }
    }

    /// Returns `false` when the report was dropped as stale.
    pub async fn report_stop_complete(&self, report: StopCompleteReport) -> bool {
        let uuid = report.uuid.clone();
        self.deliver(&uuid, "stop_complete", report, |inc| &inc.stop_complete)
            .await
    }

    pub async fn report_recover_strategy(&self, report: RecoverStrategyReport) -> bool {
        let uuid = report.uuid.clone();
        self.deliver(&uuid, "recover_strategy", report, |inc| &inc.recover_strategy)
            .await
    }

    pub async fn report_recover_status(&self, report: RecoverStatusReport) -> bool {
        let uuid = report.uuid.clone();
        self.deliver(&uuid, "recover_status", report, |inc| &inc.recover_status)
            .await
    }

    pub async fn report_schedule_result(&self, outcome: ScheduleOutcome) -> bool {
        self.deliver("", "schedule_result", outcome, |inc| &inc.schedule_result)
            .await
    }

    async fn deliver<T: Send>(
        &self,
        uuid: &str,
        kind: &'static str,
        value: T,
        mailbox: fn(&Incarnation) -> &Mailbox<T>,
    ) -> bool {
        let inc = self.current.read().await;
        let in_flight = self.state.lock().await.uuid.clone();
        let ev = |k| {
            Event::new(k)
                .with_job(self.job.job_id.as_str())
                .with_uuid(uuid)
                .with_reason(kind)
        };
        if !uuid.is_empty() && uuid != in_flight {
            self.bus.publish(ev(EventKind::ReportStale));
            return false;
        }
        if mailbox(&inc).put(value) {
            self.bus.publish(ev(EventKind::ReportOverwritten));
        }
        self.bus.publish(ev(EventKind::ReportReceived));
        true
    }

    // ---- outbound ----

    /// Puts `signal` on the incarnation's outbound queue within the enqueue budget.
    pub(crate) async fn signal_enqueue(
        &self,
        inc: &Incarnation,
        signal: ProcessManageSignal,
    ) -> Result<(), RecoverError> {
        let budget = self.cfg.enqueue_timeout;
        let summary = fault_summary(&signal.fault_ranks);
        let uuid = signal.uuid.clone();
        let kind = signal.signal_type;
        let strategy = signal.change_strategy;

        match timeout(budget, inc.signal_tx.send(signal)).await {
            Ok(Ok(())) => {}
            _ => {
                tracing::warn!(job_id = %self.job.job_id, uuid = %uuid, signal = %kind, ?budget, "signal queue busy");
                return Err(RecoverError::SignalQueueBusy { budget });
            }
        }
        tracing::debug!(
            job_id = %self.job.job_id,
            uuid = %uuid,
            signal = %kind,
            strategy = ?strategy,
            faults = %summary,
            "signal enqueued"
        );
        self.bus.publish(
            Event::new(EventKind::SignalEnqueued)
                .with_job(self.job.job_id.as_str())
                .with_uuid(&uuid)
                .with_signal(kind)
                .with_reason(summary),
        );
        Ok(())
    }

    /// Derives the next durable reset-info record from the stored one and writes it.
    ///
    /// A record that fails its checksum is replaced, not merged.
    pub(crate) async fn update_reset_info(
        &self,
        token: &CancellationToken,
        op: ResetOperation,
    ) -> Result<(), RecoverError> {
        let store = self.store();
        let name = self.job.job_name.as_str();
        let retry = &self.cfg.store_retry;

        let prior = match retry
            .run(token, "load_reset_info", |_| store.load_reset_info(name))
            .await
        {
            Ok(prior) => prior,
            Err(RecoverError::Store(err @ StoreError::Integrity { .. })) => {
                tracing::warn!(job_name = name, error = %err, "discarding corrupt reset info");
                None
            }
            Err(err) => return Err(err),
        };
        let next = prior.map(|r| r.info).unwrap_or_default().apply(&op);
        let record = StoredResetInfo::seal(name, next)?;
        retry
            .run(token, "save_reset_info", |_| {
                store.save_reset_info(name, &record)
            })
            .await?;
        tracing::debug!(job_name = name, op = op.as_label(), retry_time = record.info.retry_time, "reset info saved");
        Ok(())
    }

    // ---- loops ----

    fn spawn_loops(self: &Arc<Self>, inc: &Arc<Incarnation>) {
        let mut handles = Vec::with_capacity(2);
        if let Some(rx) = inc.take_events() {
            handles.push(tokio::spawn(
                Arc::clone(self).event_loop(Arc::clone(inc), rx),
            ));
        }
        if let Some(period) = self.cfg.keep_alive() {
            handles.push(tokio::spawn(
                Arc::clone(self).keep_alive_loop(Arc::clone(inc), period),
            ));
        }
        *self.loops.lock().unwrap_or_else(PoisonError::into_inner) = handles;
    }

    async fn event_loop(
        self: Arc<Self>,
        inc: Arc<Incarnation>,
        mut rx: mpsc::Receiver<(FsmEvent, RespCode)>,
    ) {
        let cycle = Cycle::new(&self, &inc);
        loop {
            let (event, code) = tokio::select! {
                biased;
                _ = inc.token.cancelled() => break,
                ev = rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };

            let from = self.fsm.state();
            let Some(to) = self.fsm.target(from, event) else {
                tracing::warn!(job_id = %self.job.job_id, state = %from, %event, "queued event no longer applies");
                self.bus.publish(
                    Event::new(EventKind::EventRejected)
                        .with_job(self.job.job_id.as_str())
                        .with_state(from)
                        .with_fsm_event(event)
                        .with_code(RespCode::OrderMix),
                );
                continue;
            };
            let finishing = to == State::Init;
            if finishing {
                inc.mark_retiring();
            }
            let uuid = self.state.lock().await.uuid.clone();
            self.bus.publish(
                Event::new(EventKind::Transition)
                    .with_job(self.job.job_id.as_str())
                    .with_uuid(&uuid)
                    .with_transition(from, event, to)
                    .with_code(code),
            );

            match self.fsm.trigger(event, &cycle).await {
                Ok(fired) => {
                    tracing::debug!(job_id = %self.job.job_id, path = %self.fsm.path_graph(), "fsm path");
                    if finishing {
                        self.schedule_reset(&inc);
                        break;
                    }
                    if let Some(next) = fired.next {
                        if inc.events_tx.try_send((next, fired.code)).is_err() {
                            self.fail(to, next, RespCode::EventQueueBusy, "event queue busy");
                            self.schedule_reset(&inc);
                            break;
                        }
                    }
                }
                Err(_) if inc.token.is_cancelled() => break,
                Err(err) => {
                    self.fail(to, event, err.code(), &err.as_message());
                    self.schedule_reset(&inc);
                    break;
                }
            }
        }
    }

    fn fail(&self, state: State, event: FsmEvent, code: RespCode, reason: &str) {
        tracing::error!(job_id = %self.job.job_id, %state, %event, %code, reason, "handler failed");
        self.bus.publish(
            Event::new(EventKind::HandlerFailed)
                .with_job(self.job.job_id.as_str())
                .with_state(state)
                .with_fsm_event(event)
                .with_code(code)
                .with_reason(reason),
        );
    }

    async fn keep_alive_loop(self: Arc<Self>, inc: Arc<Incarnation>, period: std::time::Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = inc.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let uuid = self.state.lock().await.uuid.clone();
            let sig = ProcessManageSignal::new(self.job.job_id.as_str(), uuid, SignalType::KeepAlive);
            if inc.signal_tx.try_send(sig).is_err() {
                tracing::warn!(job_id = %self.job.job_id, "signal queue full, keep-alive stopped");
                break;
            }
        }
    }

    // ---- reset / stop ----

    /// Retires `inc` now and replaces it in the background.
    fn schedule_reset(self: &Arc<Self>, inc: &Incarnation) {
        inc.retire();
        tokio::spawn(Arc::clone(self).reset_if_current(inc.generation));
    }

    async fn reset_if_current(self: Arc<Self>, generation: u64) {
        self.reset_inner(Some(generation)).await;
    }

    /// Cancels the current incarnation and starts a fresh one at `Init`.
    ///
    /// All job state (faults, history, uuid, latched results) is cleared.
    /// No-op once the controller is stopped.
    pub async fn reset(self: &Arc<Self>) {
        self.reset_inner(None).await;
    }

    async fn reset_inner(self: &Arc<Self>, expected: Option<u64>) {
        let mut current = self.current.write().await;
        if self.is_stopped() {
            return;
        }
        if let Some(generation) = expected {
            if current.generation != generation {
                tracing::debug!(job_id = %self.job.job_id, generation, "stale reset request ignored");
                return;
            }
        }

        current.retire();
        self.join_loops().await;
        *self.state.lock().await = JobState::default();
        self.fsm.reset();

        let next = Arc::new(Incarnation::new(
            current.generation + 1,
            self.root.child_token(),
            &self.cfg,
        ));
        *current = Arc::clone(&next);
        self.spawn_loops(&next);
        drop(current);
        self.replaced.notify_waiters();

        tracing::info!(job_id = %self.job.job_id, generation = next.generation, "controller reset");
        self.bus.publish(
            Event::new(EventKind::ControllerReset)
                .with_job(self.job.job_id.as_str())
                .with_generation(next.generation),
        );
    }

    async fn join_loops(&self) {
        let handles =
            std::mem::take(&mut *self.loops.lock().unwrap_or_else(PoisonError::into_inner));
        let deadline = Instant::now() + self.cfg.join_timeout;
        for mut handle in handles {
            if timeout_at(deadline, &mut handle).await.is_err() {
                tracing::warn!(job_id = %self.job.job_id, "loop did not exit in time, aborting");
                handle.abort();
            }
        }
    }

    /// Cancels every incarnation and joins the loops. Idempotent.
    pub async fn stop(&self) {
        let _current = self.current.write().await;
        if self.is_stopped() {
            return;
        }
        self.root.cancel();
        self.replaced.notify_waiters();
        self.join_loops().await;
        self.bus
            .publish(Event::new(EventKind::ControllerRemoved).with_job(self.job.job_id.as_str()));
    }
}
