//! # Session lifecycle events.
//!
//! The [`EventKind`] enum classifies what happened to a publishing session:
//! - **Lifecycle**: created, connected, closed, released
//! - **Failures**: connect failed, publish failed, shutdown failed
//!
//! The [`Event`] struct carries metadata: identity, subject and a reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use runner_nats::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::PublishFailed)
//!     .with_identity("abc123")
//!     .with_subject("pub.ansible.runner.test.abc123.status")
//!     .with_reason("publish_rejected");
//!
//! assert_eq!(ev.kind, EventKind::PublishFailed);
//! assert_eq!(ev.identity.as_deref(), Some("abc123"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Session created and its background thread started.
    ///
    /// Sets: `identity`, `reason` (discriminator).
    SessionCreated,

    /// Backend connection established.
    ///
    /// Sets: `identity`.
    Connected,

    /// Backend connection could not be established; the session is unusable.
    ///
    /// Sets: `identity`, `reason` (error label).
    ConnectFailed,

    /// A single publish failed.
    ///
    /// Sets: `identity`, `subject`, `reason` (error label).
    PublishFailed,

    /// Connection closed and the session loop stopped.
    ///
    /// Sets: `identity`, `reason` (error label if close failed).
    SessionClosed,

    /// Shutdown could not be submitted (loop already gone).
    ///
    /// Sets: `identity`, `reason`.
    ShutdownFailed,

    /// Registry entry removed.
    ///
    /// Sets: `identity`.
    SessionReleased,
}

/// Session event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Runner identity of the session.
    pub identity: Option<Arc<str>>,
    /// Subject involved, if any.
    pub subject: Option<Arc<str>>,
    /// Human-readable reason or error label.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            identity: None,
            subject: None,
            reason: None,
        }
    }

    /// Attaches the runner identity.
    #[inline]
    pub fn with_identity(mut self, identity: impl Into<Arc<str>>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Attaches a subject.
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True for failure kinds.
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ConnectFailed | EventKind::PublishFailed | EventKind::ShutdownFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::SessionCreated);
        let b = Event::new(EventKind::Connected);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn failure_kinds() {
        assert!(Event::new(EventKind::ConnectFailed).is_failure());
        assert!(!Event::new(EventKind::SessionClosed).is_failure());
    }
}
