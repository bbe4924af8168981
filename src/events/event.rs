//! # Runtime events emitted by controllers and the registry.
//!
//! The [`EventKind`] enum classifies events in three groups:
//! - **Protocol events**: FSM transitions and rejections, signals, reports
//! - **Lifecycle events**: controller creation, reset, removal
//! - **Subscriber events**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries the optional metadata (job id, uuid, states,
//! code, reason) set for each kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically; use it to restore order across subscribers.
//!
//! ## Example
//! ```rust
//! use faultvisor::{Event, EventKind, FsmEvent, RespCode, State};
//!
//! let ev = Event::new(EventKind::Transition)
//!     .with_job("job-1")
//!     .with_transition(State::Init, FsmEvent::FaultOccur, State::NotifyWaitFaultFlushing)
//!     .with_code(RespCode::Ok);
//!
//! assert_eq!(ev.job.as_deref(), Some("job-1"));
//! assert_eq!(ev.state, Some(State::NotifyWaitFaultFlushing));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::code::RespCode;
use crate::fsm::{FsmEvent, State};
use crate::signal::SignalType;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Protocol events ===
    /// A rule fired; the FSM entered `state` and runs its handler next.
    ///
    /// Sets: `job`, `uuid`, `from`, `fsm_event`, `state` (target), `code`
    /// (the code the triggering event was emitted with).
    Transition,

    /// An event had no rule in the current state.
    ///
    /// Sets: `job`, `state`, `fsm_event`, `code` (`OrderMix`).
    EventRejected,

    /// A handler failed; a reset follows.
    ///
    /// Sets: `job`, `state`, `fsm_event`, `code`, `reason`.
    HandlerFailed,

    /// A signal entered the outbound queue.
    ///
    /// Sets: `job`, `uuid`, `signal`, `reason` (fault summary).
    SignalEnqueued,

    /// A report was delivered to its mailbox.
    ///
    /// Sets: `job`, `uuid`, `reason` (report kind).
    ReportReceived,

    /// A report replaced an unconsumed one (latest wins).
    ///
    /// Sets: `job`, `uuid`, `reason` (report kind).
    ReportOverwritten,

    /// A report was dropped because its uuid is not the in-flight one.
    ///
    /// Sets: `job`, `uuid`, `reason` (report kind).
    ReportStale,

    // === Lifecycle events ===
    /// Controller created for a newly observed job.
    ///
    /// Sets: `job`.
    ControllerCreated,

    /// Controller reset to `Init` with a fresh incarnation.
    ///
    /// Sets: `job`, `generation` (the new one).
    ControllerReset,

    /// Controller stopped and removed.
    ///
    /// Sets: `job`.
    ControllerRemoved,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (`subscriber=<name> info=<panic>`).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (`subscriber=<name> reason=<full|closed>`).
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Job id, if the event concerns one job.
    pub job: Option<Arc<str>>,
    /// Correlation id of the in-flight exchange.
    pub uuid: Option<Arc<str>>,
    /// State before a transition.
    pub from: Option<State>,
    /// Current (or target) state.
    pub state: Option<State>,
    /// FSM input involved.
    pub fsm_event: Option<FsmEvent>,
    /// Outbound signal type.
    pub signal: Option<SignalType>,
    /// Response code.
    pub code: Option<RespCode>,
    /// Incarnation generation.
    pub generation: Option<u64>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            job: None,
            uuid: None,
            from: None,
            state: None,
            fsm_event: None,
            signal: None,
            code: None,
            generation: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches the uuid; an empty uuid is left unset.
    #[inline]
    pub fn with_uuid(mut self, uuid: &str) -> Self {
        if !uuid.is_empty() {
            self.uuid = Some(uuid.into());
        }
        self
    }

    #[inline]
    pub fn with_transition(mut self, from: State, event: FsmEvent, to: State) -> Self {
        self.from = Some(from);
        self.fsm_event = Some(event);
        self.state = Some(to);
        self
    }

    #[inline]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    #[inline]
    pub fn with_fsm_event(mut self, event: FsmEvent) -> Self {
        self.fsm_event = Some(event);
        self
    }

    #[inline]
    pub fn with_signal(mut self, signal: SignalType) -> Self {
        self.signal = Some(signal);
        self
    }

    #[inline]
    pub fn with_code(mut self, code: RespCode) -> Self {
        self.code = Some(code);
        self
    }

    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ControllerCreated);
        let b = Event::new(EventKind::ControllerCreated);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_empty_uuid_is_unset() {
        let ev = Event::new(EventKind::ReportReceived).with_uuid("");
        assert!(ev.uuid.is_none());
        let ev = ev.with_uuid("u-1");
        assert_eq!(ev.uuid.as_deref(), Some("u-1"));
    }
}
