//! Message envelope pieces: kinds, payload fields and the subject rule.

use std::fmt;

use serde_json::{Map, Value};

/// Arbitrary payload map supplied by the runner.
pub type Payload = Map<String, Value>;

/// Payload field carrying the runner identity.
pub const IDENTITY_FIELD: &str = "runner_ident";
/// Payload field carrying the run status.
pub const STATUS_FIELD: &str = "status";
/// Fixed subject prefix shared by every message.
pub const SUBJECT_PREFIX: &str = "pub.ansible.runner";

/// Statuses after which a run never progresses.
pub const TERMINAL_STATUSES: [&str; 4] = ["canceled", "successful", "timeout", "failed"];

/// Type discriminator of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Status change notification.
    Status,
    /// Structured runner event.
    Event,
}

impl MessageKind {
    /// Last subject token.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Status => "status",
            MessageKind::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds `pub.ansible.runner.<discriminator>.<identity>.<kind>`.
///
/// ```rust
/// use runner_nats::{MessageKind, subject_for};
///
/// assert_eq!(
///     subject_for("test", "abc123", MessageKind::Status),
///     "pub.ansible.runner.test.abc123.status"
/// );
/// ```
pub fn subject_for(discriminator: &str, identity: &str, kind: MessageKind) -> String {
    format!("{SUBJECT_PREFIX}.{discriminator}.{identity}.{kind}")
}

/// Returns the identity field when it is a string.
pub fn identity_of(payload: &Payload) -> Option<&str> {
    payload.get(IDENTITY_FIELD).and_then(Value::as_str)
}

/// True if `status` ends a run.
pub fn is_terminal(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

/// True if the payload carries a terminal status.
pub fn has_terminal_status(payload: &Payload) -> bool {
    payload
        .get(STATUS_FIELD)
        .and_then(Value::as_str)
        .is_some_and(is_terminal)
}
