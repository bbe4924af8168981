//! # LogWriter: runtime events as `tracing` records
//!
//! Renders every [`Event`] as one structured record. Errors go out at error
//! level, rejections and drops at warn, protocol progress at info, the rest
//! at debug. The library installs no global `tracing` subscriber; the
//! embedding binary decides where these records go.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  transition job_id=job-1 uuid=6f1c.. from=Init event=FaultOccur state=NotifyWaitFaultFlushing code=ok(0)
//! INFO  signal enqueued job_id=job-1 uuid=6f1c.. signal=stop_train faults=2:normal
//! WARN  event rejected job_id=job-1 state=Init event=NotifySuccess code=order_mix(401)
//! ERROR handler failed job_id=job-1 state=NotifyGlobalFault event=FaultFlushFinished code=operate_config_map_error(501)
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let job = e.job.as_deref().unwrap_or("-");
        let uuid = e.uuid.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::Transition => tracing::info!(
                job_id = job,
                uuid,
                from = %opt(e.from),
                event = %opt(e.fsm_event),
                state = %opt(e.state),
                code = %opt(e.code),
                "transition"
            ),
            EventKind::EventRejected => tracing::warn!(
                job_id = job,
                state = %opt(e.state),
                event = %opt(e.fsm_event),
                code = %opt(e.code),
                "event rejected"
            ),
            EventKind::HandlerFailed => tracing::error!(
                job_id = job,
                uuid,
                state = %opt(e.state),
                event = %opt(e.fsm_event),
                code = %opt(e.code),
                reason,
                "handler failed"
            ),
            EventKind::SignalEnqueued => tracing::info!(
                job_id = job,
                uuid,
                signal = %opt(e.signal),
                faults = reason,
                "signal enqueued"
            ),
            EventKind::ReportReceived => {
                tracing::info!(job_id = job, uuid, report = reason, "report received")
            }
            EventKind::ReportOverwritten => {
                tracing::warn!(job_id = job, uuid, report = reason, "report overwritten")
            }
            EventKind::ReportStale => {
                tracing::warn!(job_id = job, uuid, report = reason, "stale report dropped")
            }
            EventKind::ControllerCreated => tracing::info!(job_id = job, "controller created"),
            EventKind::ControllerReset => tracing::info!(
                job_id = job,
                generation = %opt(e.generation),
                "controller reset"
            ),
            EventKind::ControllerRemoved => tracing::info!(job_id = job, "controller removed"),
            EventKind::SubscriberOverflow => tracing::warn!(reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => tracing::error!(reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
