//! Retry knobs for calls that leave the controller.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long to pause between attempts ([`Growth`] + jitter)
//! - [`JitterPolicy`]  randomization so many controllers do not retry in lockstep
//! - [`RetryPolicy`]   attempt budget wrapped around a backoff
//!
//! ## Quick wiring
//! ```text
//! Config { store_retry, transport_retry }
//!      ├─► controller handlers: every JobStore call goes through store_retry.run(..)
//!      └─► transport::forward_signals: every send goes through transport_retry.run(..)
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 3 attempts, linear backoff from 1s (cap 10s), no jitter.

mod backoff;
mod jitter;
mod retry;

pub use backoff::{BackoffPolicy, Growth};
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
