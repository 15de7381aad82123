//! # Event bus for session lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Sessions publish
//! from their background threads, the registry from runner threads; neither ever
//! blocks. Receivers may consume from async code (`recv().await`) or from plain
//! threads (`blocking_recv()`).
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: events are lost if there are no receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Default bus capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel for session events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn publish_without_receivers_is_dropped() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::Connected));
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn receivers_see_events_in_order() {
        let bus = Bus::default();
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::SessionCreated).with_identity("a"));
        bus.publish(Event::new(EventKind::Connected).with_identity("a"));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::SessionCreated);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Connected);
    }
}
