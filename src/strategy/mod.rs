//! Strategy selection.
//!
//! ## Contents
//! - [`Strategy`] the four recovery actions, in priority order
//! - [`RecoverResult`] one recorded outcome of an applied strategy
//! - [`Negotiator`] decides which strategy applies next
//! - [`sort_strategy_names`], [`parse_strategy_list`] name handling
//!
//! ## Rules
//! - Priority is `Retry > Recover > Dump > Exit`; `Exit` is always applicable.
//! - After a failure the choice steps down; a failed level is never retried
//!   within the same cycle.

mod kind;
mod negotiator;

pub use kind::{
    RecoverResult, Strategy, UnknownStrategy, parse_strategy_list, parse_strategy_names,
    sort_strategy_names,
};
pub use negotiator::Negotiator;
