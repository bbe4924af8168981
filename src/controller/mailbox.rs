use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Capacity-one slot where the latest value wins.
///
/// `put` never blocks, so a transport adapter can always hand a report over;
/// an unconsumed older value is replaced and `put` reports it.
pub(crate) struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

impl<T> Mailbox<T> {
    /// Stores `value`; returns `true` if it replaced an unconsumed one.
    pub(crate) fn put(&self, value: T) -> bool {
        let replaced = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
            .is_some();
        self.notify.notify_one();
        replaced
    }

    pub(crate) fn try_take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Waits for a value. Cancel-safe: dropping the future loses nothing.
    pub(crate) async fn take(&self) -> T {
        loop {
            if let Some(v) = self.try_take() {
                return v;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_latest_wins() {
        let mb = Mailbox::default();
        assert!(!mb.put(1));
        assert!(mb.put(2));
        assert_eq!(mb.try_take(), Some(2));
        assert_eq!(mb.try_take(), None);
    }

    #[tokio::test]
    async fn test_take_wakes_on_put() {
        let mb = Arc::new(Mailbox::default());
        let waiter = {
            let mb = mb.clone();
            tokio::spawn(async move { mb.take().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        mb.put("report");
        assert_eq!(waiter.await.unwrap(), "report");
    }
}
