//! # Messaging backend seam.
//!
//! A session only needs three things from the backend: connect, publish and
//! close. [`Connector`] creates connections, [`Connection`] publishes on them.
//!
//! ## Implementations
//! - [`NatsConnector`]: `async-nats` client.
//! - [`MemoryConnector`]: in-process recorder for tests and demos.
//!
//! ## Example
//! ```rust,ignore
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use runner_nats::{ConnectOptions, ConnectionError, PublishError};
//! use runner_nats::backend::{Connection, Connector, Headers};
//!
//! struct Stdout;
//!
//! #[async_trait]
//! impl Connection for Stdout {
//!     async fn publish(&self, subject: &str, _h: &Headers, payload: Bytes) -> Result<(), PublishError> {
//!         println!("{subject} {}", String::from_utf8_lossy(&payload));
//!         Ok(())
//!     }
//!     async fn close(&self) -> Result<(), PublishError> { Ok(()) }
//! }
//! ```

mod memory;
mod nats;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ConnectOptions;
use crate::error::{ConnectionError, PublishError};

pub use memory::{MemoryConnector, RecordedMessage};
pub use nats::NatsConnector;

/// Headers attached to every message of a session.
pub type Headers = BTreeMap<String, String>;

/// Factory for backend connections.
///
/// Called once per session, from the session's background thread.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establishes a connection using `options`.
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>, ConnectionError>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An established backend connection.
///
/// Only the owning session's loop calls these, one at a time.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Publishes one message.
    async fn publish(
        &self,
        subject: &str,
        headers: &Headers,
        payload: Bytes,
    ) -> Result<(), PublishError>;

    /// Flushes outstanding messages and closes the connection.
    async fn close(&self) -> Result<(), PublishError>;
}
