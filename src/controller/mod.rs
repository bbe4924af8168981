//! # Per-job recovery controller.
//!
//! [`EventController`] drives one job through the recovery protocol. Inbound
//! reports land in latest-wins mailboxes; the event loop feeds FSM events to
//! [`Fsm::trigger`](crate::Fsm::trigger), whose handlers talk to the
//! agent through the outbound signal queue and to the cluster through the
//! [`JobStore`](crate::JobStore).
//!
//! ## Architecture
//! ```text
//!  report_fault / request_switch_nic ──► add_event ──► [event queue] ──► event loop ──► Fsm::trigger
//!                                                                                       │
//!  report_stop_complete ─┐                                                              ▼
//!  report_recover_*  ────┼─► mailboxes (latest wins) ◄──── waiting handlers ◄──── handlers (Cycle)
//!  report_schedule_* ────┘                                                              │
//!                                                                                       ▼
//!  SignalStream::recv ◄──────────────────────────── [signal queue] ◄──── signal_enqueue
//!                                                         ▲
//!                                            keep-alive loop (optional)
//! ```
//!
//! ## Incarnations
//! Everything a reset replaces lives in one `Incarnation`: both queues, the
//! four mailboxes and a cancellation token that is a child of the controller's
//! root token. A reset cancels it, joins its loops, clears the job state and
//! starts the next generation at `Init`.
//!
//! ## Rules
//! - Strict FIFO per controller; one event loop per incarnation.
//! - Every wait selects over {report, cancellation, timeout}.
//! - A handler error resets the controller; a timeout is an ordinary event.
//! - A report whose uuid is set and differs from the in-flight one is dropped.

mod core;
mod handlers;
mod incarnation;
mod mailbox;
mod state;

pub use core::EventController;
pub use incarnation::SignalStream;
pub use state::ControllerSnapshot;
