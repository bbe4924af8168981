//! # Controller configuration.
//!
//! [`Config`] centralizes the knobs shared by every [`EventController`](crate::EventController)
//! created through a [`Registry`](crate::Registry): queue capacities, enqueue
//! budgets, report timeouts, polling budgets and retry policies.
//!
//! Per-job recovery settings (enabled strategies, platform mode, grace exit)
//! are not here; they come from the job's own labels via
//! [`RecoverConfig::from_labels`](crate::RecoverConfig::from_labels).
//!
//! ## Sentinel values
//! - `keep_alive_interval = 0s` → no keep-alive loop is spawned
//! - `flush_window = 0s` → late-fault flush finishes immediately
//! - capacities of `0` are clamped to `1`

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Runtime configuration for controllers and the registry.
///
/// ## Field semantics
/// - `event_queue_capacity` / `signal_queue_capacity`: bounded FIFO sizes per incarnation
/// - `enqueue_timeout`: how long a send may wait on a full queue
/// - `report_timeout`: how long any handler waits for a remote report
/// - `poll_interval` + `*_poll_attempts`: fixed-interval polling budgets
/// - `join_timeout`: how long a reset waits for the old loops before aborting them
/// - `grace`: how long registry shutdown waits for all controllers
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the per-incarnation FSM event queue.
    pub event_queue_capacity: usize,

    /// Capacity of the per-incarnation outbound signal queue.
    pub signal_queue_capacity: usize,

    /// Budget for putting an event or a signal into a full queue.
    ///
    /// An event that misses the budget schedules a reset; a signal that misses
    /// it fails the handler with `SignalQueueBusy`.
    pub enqueue_timeout: Duration,

    /// How long a handler waits for a remote report before emitting `ReportTimeout`.
    pub report_timeout: Duration,

    /// Window during which late fault reports are still merged before the global fault is sent.
    ///
    /// - `Duration::ZERO` = no window
    pub flush_window: Duration,

    /// Period of the keep-alive signal.
    ///
    /// - `Duration::ZERO` = keep-alive disabled
    pub keep_alive_interval: Duration,

    /// Interval between polls of the store or a mailbox.
    pub poll_interval: Duration,

    /// Polls for the scheduler outcome after a Recover strategy.
    pub schedule_poll_attempts: u32,

    /// Polls for pods running again during a fault retry.
    pub pods_running_poll_attempts: u32,

    /// Polls for the platform answer (confirmed faults, platform strategies).
    pub platform_poll_attempts: u32,

    /// Polls for the rank table after restarting all processes.
    pub restart_poll_attempts: u32,

    /// How long a reset waits for the previous incarnation's loops to exit.
    pub join_timeout: Duration,

    /// Maximum wait for all controllers during registry shutdown.
    pub grace: Duration,

    /// Capacity of the event bus broadcast ring buffer.
    pub bus_capacity: usize,

    /// Retry budget for every resource-store call.
    pub store_retry: RetryPolicy,

    /// Retry budget for every signal delivered through an agent transport.
    pub transport_retry: RetryPolicy,
}

impl Config {
    /// Keep-alive period, or `None` when disabled.
    #[inline]
    pub fn keep_alive(&self) -> Option<Duration> {
        if self.keep_alive_interval == Duration::ZERO {
            None
        } else {
            Some(self.keep_alive_interval)
        }
    }

    /// Flush window, or `None` when late faults are not awaited.
    #[inline]
    pub fn flush(&self) -> Option<Duration> {
        if self.flush_window == Duration::ZERO {
            None
        } else {
            Some(self.flush_window)
        }
    }

    #[inline]
    pub fn event_capacity_clamped(&self) -> usize {
        self.event_queue_capacity.max(1)
    }

    #[inline]
    pub fn signal_capacity_clamped(&self) -> usize {
        self.signal_queue_capacity.max(1)
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - queues of 10, 1s enqueue budget
    /// - `report_timeout = 15min`
    /// - `flush_window = 5s`, `keep_alive_interval = 10s`
    /// - `poll_interval = 5s`; 60 schedule polls, 60 pod polls, 12 platform polls, 60 restart polls
    /// - `join_timeout = 5s`, `grace = 30s`, `bus_capacity = 1024`
    /// - `RetryPolicy::default()` for store and transport
    fn default() -> Self {
        Self {
            event_queue_capacity: 10,
            signal_queue_capacity: 10,
            enqueue_timeout: Duration::from_secs(1),
            report_timeout: Duration::from_secs(15 * 60),
            flush_window: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            schedule_poll_attempts: 60,
            pods_running_poll_attempts: 60,
            platform_poll_attempts: 12,
            restart_poll_attempts: 60,
            join_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            store_retry: RetryPolicy::default(),
            transport_retry: RetryPolicy::default(),
        }
    }
}
