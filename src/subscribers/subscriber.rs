//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for reacting to runtime events (audit,
//! metrics, status propagation). Each subscriber is driven by its own worker
//! fed by a bounded queue owned by the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they block neither the publisher nor other
//!   subscribers.
//! - On queue overflow events for that subscriber are dropped and a
//!   `SubscriberOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use faultvisor::{Event, EventKind, Subscribe};
//!
//! struct ResetCounter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for ResetCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ControllerReset {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "reset-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
