use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use super::event::{FsmEvent, Handler};
use super::rules::{Rule, default_rules};
use super::state::State;
use crate::code::RespCode;
use crate::error::RecoverError;

/// Longest diagnostic trace kept between resets.
const PATH_LIMIT: usize = 64;

/// What a handler produced: the next event to enqueue (if any) and a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub next: Option<FsmEvent>,
    pub code: RespCode,
}

impl Fired {
    /// `next` with [`RespCode::Ok`].
    pub fn then(next: FsmEvent) -> Self {
        Self {
            next: Some(next),
            code: RespCode::Ok,
        }
    }

    /// `next` with a non-ok code (timeouts, kill decisions).
    pub fn with_code(next: FsmEvent, code: RespCode) -> Self {
        Self {
            next: Some(next),
            code,
        }
    }

    /// Nothing to enqueue.
    pub fn done() -> Self {
        Self {
            next: None,
            code: RespCode::Ok,
        }
    }
}

/// Runs the handler bound to a rule.
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, handler: Handler) -> Result<Fired, RecoverError>;
}

/// One applied transition, for the diagnostic trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: State,
    pub event: FsmEvent,
    pub to: State,
}

/// Rule-driven state machine.
///
/// The rule table is immutable after construction. The current state lives in
/// a `watch` channel so readers never contend with [`Fsm::trigger`].
///
/// ## Rules
/// - [`Fsm::trigger`] has a single caller (the controller's event loop); it is
///   not meant for concurrent use.
/// - The state moves to the rule's target before its handler runs; the
///   handler does the work of that state. A failing handler leaves the
///   target state in place and the caller decides how to recover.
/// - An event without a rule is rejected with [`RecoverError::Rejected`] and
///   nothing changes.
pub struct Fsm {
    rules: HashMap<(State, FsmEvent), Rule>,
    state: watch::Sender<State>,
    path: Mutex<Vec<Step>>,
}

impl Default for Fsm {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Fsm {
    pub fn new(rules: Vec<Rule>) -> Self {
        let rules = rules.into_iter().map(|r| ((r.source, r.event), r)).collect();
        let (state, _) = watch::channel(State::Init);
        Self {
            rules,
            state,
            path: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Receiver observing every state change.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Whether a rule exists for `event` in `state`. No side effects.
    #[inline]
    pub fn rule_check(&self, state: State, event: FsmEvent) -> bool {
        self.rules.contains_key(&(state, event))
    }

    /// Target of the rule for `event` in `state`, if there is one.
    #[inline]
    pub fn target(&self, state: State, event: FsmEvent) -> Option<State> {
        self.rules.get(&(state, event)).map(|r| r.target)
    }

    /// Fires the rule for `event` in the current state.
    pub async fn trigger<X>(&self, event: FsmEvent, exec: &X) -> Result<Fired, RecoverError>
    where
        X: Execute + ?Sized,
    {
        let from = self.state();
        let rule = *self
            .rules
            .get(&(from, event))
            .ok_or(RecoverError::Rejected { state: from, event })?;

        self.state.send_replace(rule.target);
        {
            let mut path = self.path.lock().unwrap_or_else(PoisonError::into_inner);
            if path.len() == PATH_LIMIT {
                path.remove(0);
            }
            path.push(Step {
                from,
                event,
                to: rule.target,
            });
        }

        exec.execute(rule.handler).await
    }

    /// Trace of the transitions since the last reset, e.g. `Init -FaultOccur-> NotifyWaitFaultFlushing`.
    pub fn path_graph(&self) -> String {
        let path = self.path.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(first) = path.first() else {
            return self.state().to_string();
        };
        let mut out = first.from.to_string();
        for step in path.iter() {
            out.push_str(&format!(" -{}-> {}", step.event, step.to));
        }
        out
    }

    /// Back to `Init` with an empty trace.
    pub fn reset(&self) {
        self.path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.state.send_replace(State::Init);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Execute for Recording {
        async fn execute(&self, handler: Handler) -> Result<Fired, RecoverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RecoverError::Cancelled);
            }
            Ok(match handler {
                Handler::NotifyWaitFaultFlushing => Fired::then(FsmEvent::NotifySuccess),
                _ => Fired::done(),
            })
        }
    }

    fn exec(fail: bool) -> Recording {
        Recording {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[tokio::test]
    async fn test_trigger_advances_and_returns_next() {
        let fsm = Fsm::default();
        let x = exec(false);
        let fired = fsm.trigger(FsmEvent::FaultOccur, &x).await.unwrap();
        assert_eq!(fired.next, Some(FsmEvent::NotifySuccess));
        assert_eq!(fsm.state(), State::NotifyWaitFaultFlushing);

        fsm.trigger(FsmEvent::NotifySuccess, &x).await.unwrap();
        assert_eq!(fsm.state(), State::NotifyStopTrain);
        assert_eq!(
            fsm.path_graph(),
            "Init -FaultOccur-> NotifyWaitFaultFlushing -NotifySuccess-> NotifyStopTrain"
        );
    }

    #[tokio::test]
    async fn test_rejection_has_no_side_effects() {
        let fsm = Fsm::default();
        let x = exec(false);
        assert!(!fsm.rule_check(State::Init, FsmEvent::NotifySuccess));

        let err = fsm.trigger(FsmEvent::NotifySuccess, &x).await.unwrap_err();
        assert!(matches!(
            err,
            RecoverError::Rejected {
                state: State::Init,
                event: FsmEvent::NotifySuccess
            }
        ));
        assert_eq!(fsm.state(), State::Init);
        assert_eq!(x.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fsm.path_graph(), "Init");
    }

    #[tokio::test]
    async fn test_handler_error_leaves_target_state() {
        let fsm = Fsm::default();
        let x = exec(true);
        assert!(fsm.trigger(FsmEvent::FaultOccur, &x).await.is_err());
        assert_eq!(fsm.state(), State::NotifyWaitFaultFlushing);
        assert_eq!(x.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fsm.path_graph(), "Init -FaultOccur-> NotifyWaitFaultFlushing");
    }

    struct Observing {
        state: watch::Receiver<State>,
        seen: Mutex<Vec<(Handler, State)>>,
    }

    #[async_trait]
    impl Execute for Observing {
        async fn execute(&self, handler: Handler) -> Result<Fired, RecoverError> {
            let now = *self.state.borrow();
            self.seen.lock().unwrap().push((handler, now));
            Ok(Fired::done())
        }
    }

    #[tokio::test]
    async fn test_handler_runs_in_target_state() {
        let fsm = Fsm::default();
        let x = Observing {
            state: fsm.subscribe(),
            seen: Mutex::new(Vec::new()),
        };
        assert_eq!(
            fsm.target(State::Init, FsmEvent::FaultOccur),
            Some(State::NotifyWaitFaultFlushing)
        );
        assert_eq!(fsm.target(State::Init, FsmEvent::NotifySuccess), None);

        fsm.trigger(FsmEvent::FaultOccur, &x).await.unwrap();
        fsm.trigger(FsmEvent::NotifySuccess, &x).await.unwrap();
        assert_eq!(
            *x.seen.lock().unwrap(),
            vec![
                (Handler::NotifyWaitFaultFlushing, State::NotifyWaitFaultFlushing),
                (Handler::NotifyStopTrain, State::NotifyStopTrain),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_and_watch() {
        let fsm = Fsm::default();
        let mut rx = fsm.subscribe();
        fsm.trigger(FsmEvent::FaultOccur, &exec(false)).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), State::NotifyWaitFaultFlushing);

        fsm.reset();
        assert_eq!(fsm.state(), State::Init);
        assert_eq!(fsm.path_graph(), "Init");
    }
}
