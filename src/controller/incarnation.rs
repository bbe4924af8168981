use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::mailbox::Mailbox;
use crate::code::RespCode;
use crate::config::Config;
use crate::fsm::FsmEvent;
use crate::signal::{
    ProcessManageSignal, RecoverStatusReport, RecoverStrategyReport, ScheduleOutcome,
    StopCompleteReport,
};

/// Channels and cancellation scope of one span between resets.
///
/// Replaced as a whole by a reset; code that blocks works on an `Arc` snapshot
/// taken once, never on the controller's current pointer.
///
/// An incarnation is retired as soon as its end is decided (a `Finish` about
/// to fire, a failed handler, a reset). It accepts no new input from then on,
/// even though it stays current until the reset swaps it out.
pub(crate) struct Incarnation {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
    retiring: AtomicBool,
    /// Queued events carry the code they were emitted with.
    pub(crate) events_tx: mpsc::Sender<(FsmEvent, RespCode)>,
    events_rx: Mutex<Option<mpsc::Receiver<(FsmEvent, RespCode)>>>,
    pub(crate) signal_tx: mpsc::Sender<ProcessManageSignal>,
    signal_rx: Arc<AsyncMutex<mpsc::Receiver<ProcessManageSignal>>>,
    pub(crate) stop_complete: Mailbox<StopCompleteReport>,
    pub(crate) recover_strategy: Mailbox<RecoverStrategyReport>,
    pub(crate) recover_status: Mailbox<RecoverStatusReport>,
    pub(crate) schedule_result: Mailbox<ScheduleOutcome>,
}

impl Incarnation {
    pub(crate) fn new(generation: u64, token: CancellationToken, cfg: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(cfg.event_capacity_clamped());
        let (signal_tx, signal_rx) = mpsc::channel(cfg.signal_capacity_clamped());
        Self {
            generation,
            token,
            retiring: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            signal_tx,
            signal_rx: Arc::new(AsyncMutex::new(signal_rx)),
            stop_complete: Mailbox::default(),
            recover_strategy: Mailbox::default(),
            recover_status: Mailbox::default(),
            schedule_result: Mailbox::default(),
        }
    }

    /// Stops accepting input; the loops keep running.
    pub(crate) fn mark_retiring(&self) {
        self.retiring.store(true, Ordering::SeqCst);
    }

    /// Stops accepting input and cancels the loops.
    pub(crate) fn retire(&self) {
        self.mark_retiring();
        self.token.cancel();
    }

    /// Whether inbound events and faults still belong here.
    pub(crate) fn is_live(&self) -> bool {
        !self.retiring.load(Ordering::SeqCst) && !self.token.is_cancelled()
    }

    /// Hands the event receiver to the event loop; `None` after the first call.
    pub(crate) fn take_events(&self) -> Option<mpsc::Receiver<(FsmEvent, RespCode)>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn signal_stream(&self) -> SignalStream {
        SignalStream {
            generation: self.generation,
            token: self.token.clone(),
            rx: Arc::clone(&self.signal_rx),
        }
    }
}

/// Outbound signals of one incarnation.
///
/// [`SignalStream::recv`] returns `None` once the incarnation is reset or the
/// controller stops and nothing is left queued; the consumer then asks the
/// controller for a fresh stream.
#[derive(Clone)]
pub struct SignalStream {
    generation: u64,
    token: CancellationToken,
    rx: Arc<AsyncMutex<mpsc::Receiver<ProcessManageSignal>>>,
}

impl SignalStream {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token cancelled when this incarnation ends.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Next signal, or `None` once the incarnation has ended and its queue is drained.
    ///
    /// Signals enqueued before a reset (a kill decision, typically) are still
    /// delivered.
    pub async fn recv(&self) -> Option<ProcessManageSignal> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            sig = rx.recv() => sig,
            _ = self.token.cancelled() => rx.try_recv().ok(),
        }
    }

    /// Next signal if one is queued right now.
    pub fn try_recv(&self) -> Option<ProcessManageSignal> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retiring_refuses_input_before_cancel() {
        let inc = Incarnation::new(3, CancellationToken::new(), &Config::default());
        assert!(inc.is_live());

        inc.mark_retiring();
        assert!(!inc.is_live());
        assert!(!inc.token.is_cancelled());

        inc.retire();
        assert!(inc.token.is_cancelled());
    }

    #[test]
    fn test_cancelled_scope_is_not_live() {
        let root = CancellationToken::new();
        let inc = Incarnation::new(0, root.child_token(), &Config::default());
        root.cancel();
        assert!(!inc.is_live());
    }
}
