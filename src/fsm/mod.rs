//! # Rule-based recovery FSM.
//!
//! A rule binds `(source state, event)` to `(handler, target state)`. The FSM
//! itself does no I/O: handlers are run through the [`Execute`] seam, which the
//! controller implements.
//!
//! ```text
//!   trigger(ev) ──► rules[(state, ev)] ──none──► Err(Rejected)   (state unchanged)
//!                         │
//!                         ▼
//!                 exec.execute(handler) ──err──► Err(e)           (state unchanged)
//!                         │ ok(Fired{next, code})
//!                         ▼
//!                 state = target; path += step; return Fired
//! ```
//!
//! ## Contents
//! - [`State`], [`FsmEvent`], [`Handler`] closed vocabularies
//! - [`Rule`], [`default_rules`] the recovery protocol table
//! - [`Fsm`], [`Execute`], [`Fired`] the machine and its handler seam

mod event;
mod machine;
mod rules;
mod state;

pub use event::{FsmEvent, Handler};
pub use machine::{Execute, Fired, Fsm, Step};
pub use rules::{Rule, default_rules};
pub use state::State;
