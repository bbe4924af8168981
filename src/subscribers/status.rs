//! # StatusAnnotator: recovery state on the job resource
//!
//! Writes the target state of every transition to the job's
//! [`RECOVER_STATUS`](crate::store::RECOVER_STATUS) annotation, so the state
//! of a recovery is visible from outside the process. A reset writes `Init`.
//!
//! Writes are best effort: one attempt, failures are logged and the next
//! transition overwrites the value anyway.

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::fsm::State;
use crate::store::{JobStore, RECOVER_STATUS};
use crate::subscribers::Subscribe;

pub struct StatusAnnotator {
    store: Arc<dyn JobStore>,
}

impl StatusAnnotator {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Subscribe for StatusAnnotator {
    async fn on_event(&self, e: &Event) {
        let state = match e.kind {
            EventKind::Transition => e.state,
            EventKind::ControllerReset => Some(State::Init),
            _ => None,
        };
        let (Some(job), Some(state)) = (e.job.as_deref(), state) else {
            return;
        };
        if let Err(err) = self
            .store
            .set_annotation(job, RECOVER_STATUS, state.as_str())
            .await
        {
            tracing::warn!(job_id = job, state = %state, error = %err, "recover status not written");
        }
    }

    fn name(&self) -> &'static str {
        "StatusAnnotator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::FsmEvent;
    use crate::store::MemoryJobStore;

    #[tokio::test]
    async fn test_transition_and_reset_are_written() {
        let store = Arc::new(MemoryJobStore::new());
        let sub = StatusAnnotator::new(store.clone());

        sub.on_event(
            &Event::new(EventKind::Transition)
                .with_job("job-1")
                .with_transition(State::Init, FsmEvent::FaultOccur, State::NotifyWaitFaultFlushing),
        )
        .await;
        assert_eq!(
            store.annotation("job-1", RECOVER_STATUS).await.unwrap().as_deref(),
            Some("NotifyWaitFaultFlushing")
        );

        sub.on_event(&Event::new(EventKind::ControllerReset).with_job("job-1"))
            .await;
        assert_eq!(
            store.annotation("job-1", RECOVER_STATUS).await.unwrap().as_deref(),
            Some("Init")
        );
    }

    #[tokio::test]
    async fn test_events_without_job_are_ignored() {
        let store = Arc::new(MemoryJobStore::new());
        let sub = StatusAnnotator::new(store.clone());
        sub.on_event(&Event::new(EventKind::Transition).with_state(State::FaultClear))
            .await;
        sub.on_event(&Event::new(EventKind::SignalEnqueued).with_job("job-1"))
            .await;
        assert_eq!(store.annotation("job-1", RECOVER_STATUS).await.unwrap(), None);
    }
}
