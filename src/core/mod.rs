//! Core: publishing sessions and the registry that owns them.
//!
//! Internal modules:
//! - [`message`]: message kinds, payload fields and the subject rule;
//! - [`completion`]: handle returned by every submission;
//! - [`session`]: one connection served by one background thread;
//! - [`registry`]: at most one session per runner identity.

mod completion;
mod message;
mod registry;
mod session;

pub use completion::Completion;
pub use message::{
    IDENTITY_FIELD, MessageKind, Payload, STATUS_FIELD, SUBJECT_PREFIX, TERMINAL_STATUSES,
    has_terminal_status, identity_of, is_terminal, subject_for,
};
pub use registry::Registry;
pub use session::Session;
