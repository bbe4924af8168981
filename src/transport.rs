//! # Agent transport.
//!
//! The controller only fills a queue; delivery is the embedder's business.
//! [`AgentTransport`] is the seam, [`forward_signals`] the pump that drains a
//! controller's [`SignalStream`](crate::SignalStream)s through it.
//!
//! ```text
//! loop until controller stopped:
//!   stream = ctl.signal_stream()            (current incarnation)
//!   while let Some(sig) = stream.recv():
//!       cfg.transport_retry.run(|_| transport.send(&sig))  (bounded, 5xx only)
//!   // None: incarnation ended and its queue is drained → take the next stream
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::EventController;
use crate::error::TransportError;
use crate::signal::ProcessManageSignal;

/// Delivers signals to the job's agent. Implementations must tolerate
/// redelivery of the same `uuid`.
#[async_trait]
pub trait AgentTransport: Send + Sync + 'static {
    async fn send(&self, signal: &ProcessManageSignal) -> Result<(), TransportError>;
}

/// Pumps every signal of `ctl` through `transport` until the controller stops.
///
/// Sends are retried with the controller's [`Config::transport_retry`](crate::Config).
/// A signal that still fails after the retry budget is logged and dropped; the
/// FSM does not wait on delivery, only on the agent's reports.
pub async fn forward_signals(ctl: Arc<EventController>, transport: Arc<dyn AgentTransport>) {
    let job_id = ctl.job().job_id.clone();
    let retry = ctl.config().transport_retry;
    while !ctl.is_stopped() {
        let stream = ctl.signal_stream().await;
        while let Some(signal) = stream.recv().await {
            let sent = retry
                .run(ctl.stop_token(), "send_signal", |_| transport.send(&signal))
                .await;
            match sent {
                Ok(()) => tracing::debug!(
                    job_id = %job_id,
                    uuid = %signal.uuid,
                    signal = %signal.signal_type,
                    "signal delivered"
                ),
                Err(err) => tracing::warn!(
                    job_id = %job_id,
                    uuid = %signal.uuid,
                    signal = %signal.signal_type,
                    error = %err,
                    "signal not delivered"
                ),
            }
        }
    }
    tracing::debug!(job_id = %job_id, "signal forwarding stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::policies::RetryPolicy;
    use crate::events::Bus;
    use crate::fault::FaultRank;
    use crate::job::{JobBaseInfo, RecoverConfig};
    use crate::signal::{SignalType, StopCompleteReport};
    use crate::store::MemoryJobStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Flaky {
        failures_left: AtomicU32,
        seen: Mutex<Vec<SignalType>>,
    }

    #[async_trait]
    impl AgentTransport for Flaky {
        async fn send(&self, signal: &ProcessManageSignal) -> Result<(), TransportError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Unavailable {
                    error: "connection reset".into(),
                });
            }
            self.seen.lock().unwrap().push(signal.signal_type);
            Ok(())
        }
    }

    fn start(transport_retry: RetryPolicy) -> Arc<EventController> {
        let cfg = Config {
            flush_window: Duration::ZERO,
            keep_alive_interval: Duration::ZERO,
            transport_retry,
            ..Config::default()
        };
        let rc = RecoverConfig {
            process_recover_enable: true,
            ..RecoverConfig::default()
        };
        let job = JobBaseInfo::new("job-1", "train", "pg-train", "default", rc);
        EventController::start(job, cfg, Arc::new(MemoryJobStore::new()), Bus::new(16))
    }

    async fn wait_seen(transport: &Flaky) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_forwards_with_retry_until_stopped() {
        let ctl = start(RetryPolicy::immediate(3));

        let transport = Arc::new(Flaky {
            failures_left: AtomicU32::new(1),
            ..Flaky::default()
        });
        let pump = tokio::spawn(forward_signals(ctl.clone(), transport.clone()));

        ctl.report_fault(vec![FaultRank::normal("0")]).await.unwrap();
        wait_seen(&transport).await;
        assert_eq!(*transport.seen.lock().unwrap(), vec![SignalType::StopTrain]);

        ctl.stop().await;
        tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_budget_comes_from_config() {
        let ctl = start(RetryPolicy::immediate(1));
        let transport = Arc::new(Flaky {
            failures_left: AtomicU32::new(1),
            ..Flaky::default()
        });
        let pump = tokio::spawn(forward_signals(ctl.clone(), transport.clone()));

        ctl.report_fault(vec![FaultRank::normal("0")]).await.unwrap();
        let mut rx = ctl.watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| *s == crate::fsm::State::WaitReportStopComplete),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(ctl.report_stop_complete(StopCompleteReport::default()).await);

        wait_seen(&transport).await;
        assert_eq!(*transport.seen.lock().unwrap(), vec![SignalType::GlobalFault]);

        ctl.stop().await;
        tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .unwrap()
            .unwrap();
    }
}
