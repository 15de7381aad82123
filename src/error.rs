//! Error types used by the options resolver, the backend and publishing sessions.
//!
//! This module defines four enums:
//!
//! - [`ConfigError`]: malformed environment values met while resolving options.
//! - [`ConnectionError`]: the backend could not be reached or rejected credentials.
//! - [`PublishError`]: a single publish (or the final close) failed.
//! - [`SessionError`]: what a [`Completion`](crate::Completion) resolves to on failure.
//!
//! All types provide `as_label` for logs and the event feed.

use thiserror::Error;

/// # Errors produced while resolving session configuration.
///
/// `InvalidNumber` disables the feature for the run; `InvalidHeader` only drops
/// the offending header item.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric environment variable was present but could not be parsed.
    #[error("invalid numeric value {value:?} for {key}")]
    InvalidNumber {
        /// Environment variable name.
        key: String,
        /// Raw value found in the environment.
        value: String,
    },

    /// A header item was not of the form `key=value`.
    #[error("invalid header item {item:?}")]
    InvalidHeader {
        /// The raw item, as found between commas.
        item: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use runner_nats::ConfigError;
    ///
    /// let err = ConfigError::InvalidHeader { item: "nope".into() };
    /// assert_eq!(err.as_label(), "config_invalid_header");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidNumber { .. } => "config_invalid_number",
            ConfigError::InvalidHeader { .. } => "config_invalid_header",
        }
    }
}

/// # Errors produced while establishing a backend connection.
///
/// A session whose connect failed stays unusable; no retry happens in this crate.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Server unreachable, handshake failed or authorization rejected.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Credentials file could not be loaded.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// A configured server address could not be parsed.
    #[error("invalid server address: {0}")]
    InvalidServer(String),
}

impl ConnectionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionError::Connect(_) => "connection_failed",
            ConnectionError::Credentials(_) => "connection_credentials",
            ConnectionError::InvalidServer(_) => "connection_invalid_server",
        }
    }
}

/// # Errors produced by a single publish attempt.
///
/// A publish error never affects other queued or future publishes of the session.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Payload could not be encoded as JSON.
    #[error("payload serialization failed: {0}")]
    Serialize(String),

    /// Backend refused the message.
    #[error("backend rejected message: {0}")]
    Rejected(String),

    /// The session never connected (connect failed earlier).
    #[error("session is not connected")]
    NotConnected,

    /// Publish arrived while connecting and the pending buffer was full.
    #[error("pending buffer overflow: {size} bytes queued, limit {limit}")]
    PendingOverflow {
        /// Bytes that would be buffered including this message.
        size: usize,
        /// Buffer limit in bytes.
        limit: usize,
    },

    /// Flushing or closing the connection failed.
    #[error("close failed: {0}")]
    Close(String),
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Serialize(_) => "publish_serialize",
            PublishError::Rejected(_) => "publish_rejected",
            PublishError::NotConnected => "publish_not_connected",
            PublishError::PendingOverflow { .. } => "publish_pending_overflow",
            PublishError::Close(_) => "publish_close",
        }
    }
}

/// # Errors a submitted session command can resolve to.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Connect failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Publish or close failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The session loop is no longer running.
    #[error("session stopped")]
    Stopped,

    /// The background thread or its runtime could not be created.
    #[error("session runtime failed: {0}")]
    Runtime(String),

    /// The backend panicked while executing the command.
    #[error("backend panicked: {0}")]
    Panicked(String),
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use runner_nats::{PublishError, SessionError};
    ///
    /// let err = SessionError::from(PublishError::NotConnected);
    /// assert_eq!(err.as_label(), "publish_not_connected");
    /// assert_eq!(SessionError::Stopped.as_label(), "session_stopped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::Connection(e) => e.as_label(),
            SessionError::Publish(e) => e.as_label(),
            SessionError::Stopped => "session_stopped",
            SessionError::Runtime(_) => "session_runtime",
            SessionError::Panicked(_) => "session_panicked",
        }
    }
}
