//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that every controller and the
//! registry can publish without blocking.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Consumer (one):
//!   EventController job-a ──┐
//!   EventController job-b ──┼────► Bus ────► registry listener ────► SubscriberSet
//!   Registry ───────────────┤   (broadcast)
//!   SubscriberSet workers ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - One ring buffer of `capacity` events is shared by all receivers; a receiver
//!   that falls behind observes `RecvError::Lagged(n)` and skips `n` events.
//! - Events published while nobody listens are lost.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_receivers() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ControllerCreated).with_job("j"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ControllerCreated);
        assert_eq!(ev.job.as_deref(), Some("j"));
    }

    #[test]
    fn test_publish_without_receivers_is_fine() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::ControllerRemoved));
    }
}
