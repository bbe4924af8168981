//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in subscribers.
//!
//! ## Architecture
//! ```text
//!   EventController ── publish(Event) ──► Bus ──► registry listener ──► SubscriberSet
//!                                                                          │
//!                                                        ┌─────────────────┼──────────────┐
//!                                                        ▼                 ▼              ▼
//!                                                    LogWriter     StatusAnnotator     custom
//! ```
//!
//! ## Built-in
//! - [`LogWriter`] renders events as `tracing` records
//! - [`StatusAnnotator`] mirrors the FSM state onto the job's status annotation

mod log;
mod set;
mod status;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use status::StatusAnnotator;
pub use subscriber::Subscribe;
