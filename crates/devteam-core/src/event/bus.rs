//! Broadcast event bus for distributing workflow notifications to multiple
//! subscribers.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op.
//! Closing the bus drops the sender, so every subscriber observes
//! `RecvError::Closed` once it has drained the events already published.

use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

/// Multi-consumer event bus for one category of workflow notification.
///
/// Publishing never waits on subscribers; a subscriber that falls more than
/// `capacity` events behind receives `RecvError::Lagged`.
pub struct EventBus<T> {
    sender: RwLock<Option<broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Create a new subscriber that will receive all future events.
    ///
    /// Subscribing to a closed bus yields a receiver that is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        match self.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, or the bus is closed, the event is
    /// silently dropped.
    pub fn publish(&self, event: T) {
        if let Some(sender) = self.read().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Drop the sender, ending every subscription.
    pub fn close(&self) {
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.read().is_none()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.read()
            .as_ref()
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<broadcast::Sender<T>>> {
        self.sender.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.receiver_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
