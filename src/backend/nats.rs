//! # NatsConnector: `async-nats` backend
//!
//! Maps [`ConnectOptions`] onto [`async_nats::ConnectOptions`]:
//!
//! | option                  | client setting                          |
//! |-------------------------|-----------------------------------------|
//! | `servers`               | connect addresses (default local 4222)  |
//! | `name`                  | `name`                                  |
//! | `allow_reconnect=false` | `max_reconnects(0)`                     |
//! | `max_reconnect_attempts`| `max_reconnects` (negative = unlimited) |
//! | `connect_timeout`       | `connection_timeout`                    |
//! | `reconnect_time_wait`   | `reconnect_delay_callback`              |
//! | `ping_interval`         | `ping_interval`                         |
//! | `flusher_queue_size`    | `client_capacity`                       |
//! | `user`/`password`       | `user_and_password`                     |
//! | `token`                 | `token`                                 |
//! | `user_credentials`      | `credentials_file`                      |
//! | `nkeys_seed`            | `nkey`                                  |
//!
//! `verbose` and `max_outstanding_pings` have no client equivalent and are
//! ignored. `pending_size` is enforced by the session backlog, not here.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use super::{Connection, Connector, Headers};
use crate::config::ConnectOptions;
use crate::error::{ConnectionError, PublishError};

/// Server used when no address is configured.
pub const DEFAULT_SERVER: &str = "nats://127.0.0.1:4222";

/// Flush timeout used on close when none is configured.
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector backed by a real NATS client.
#[derive(Clone, Copy, Debug, Default)]
pub struct NatsConnector;

impl NatsConnector {
    /// Creates the connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn client_options(
        options: &ConnectOptions,
    ) -> Result<async_nats::ConnectOptions, ConnectionError> {
        let mut opts = async_nats::ConnectOptions::new();

        if let Some(name) = &options.name {
            opts = opts.name(name);
        }
        if let Some(timeout) = options.connect_timeout() {
            opts = opts.connection_timeout(timeout);
        }
        if let Some(interval) = options.ping_interval() {
            opts = opts.ping_interval(interval);
        }
        if let Some(cap) = options.flusher_queue_size {
            opts = opts.client_capacity(cap.max(1));
        }
        if let Some(wait) = options.reconnect_time_wait() {
            opts = opts.reconnect_delay_callback(move |_attempts| wait);
        }
        if options.allow_reconnect == Some(false) {
            opts = opts.max_reconnects(Some(0));
        } else if options.max_reconnect_attempts.is_some() {
            opts = opts.max_reconnects(options.reconnect_limit());
        }

        if let (Some(user), Some(password)) = (&options.user, &options.password) {
            opts = opts.user_and_password(user.clone(), password.clone());
        }
        if let Some(token) = &options.token {
            opts = opts.token(token.clone());
        }
        if let Some(seed) = &options.nkeys_seed {
            opts = opts.nkey(seed.clone());
        }
        if let Some(path) = &options.user_credentials {
            opts = opts
                .credentials_file(path)
                .await
                .map_err(|e| ConnectionError::Credentials(format!("{path}: {e}")))?;
        }

        if options.verbose.is_some() || options.max_outstanding_pings.is_some() {
            debug!("verbose and max_outstanding_pings are not supported by the client, ignoring");
        }
        Ok(opts)
    }
}

#[async_trait]
impl Connector for NatsConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let servers = match &options.servers {
            Some(servers) if !servers.is_empty() => servers.clone(),
            _ => vec![DEFAULT_SERVER.to_string()],
        };
        let addrs = servers
            .iter()
            .map(|s| {
                s.parse::<async_nats::ServerAddr>()
                    .map_err(|e| ConnectionError::InvalidServer(format!("{s}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = Self::client_options(options)
            .await?
            .connect(addrs.as_slice())
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        debug!(servers = ?servers, "nats connection established");
        Ok(Box::new(NatsConnection {
            client: Mutex::new(Some(client)),
            flush_timeout: options.flush_timeout().unwrap_or(DEFAULT_FLUSH_TIMEOUT),
        }))
    }

    fn name(&self) -> &'static str {
        "nats"
    }
}

struct NatsConnection {
    client: Mutex<Option<async_nats::Client>>,
    flush_timeout: Duration,
}

impl NatsConnection {
    fn client(&self) -> Option<async_nats::Client> {
        self.client.lock().clone()
    }
}

fn header_map(headers: &Headers) -> async_nats::HeaderMap {
    let mut map = async_nats::HeaderMap::new();
    for (k, v) in headers {
        map.insert(k.as_str(), v.as_str());
    }
    map
}

#[async_trait]
impl Connection for NatsConnection {
    async fn publish(
        &self,
        subject: &str,
        headers: &Headers,
        payload: Bytes,
    ) -> Result<(), PublishError> {
        let Some(client) = self.client() else {
            return Err(PublishError::Rejected("connection closed".into()));
        };
        let result = if headers.is_empty() {
            client.publish(subject.to_string(), payload).await
        } else {
            client
                .publish_with_headers(subject.to_string(), header_map(headers), payload)
                .await
        };
        result.map_err(|e| PublishError::Rejected(e.to_string()))
    }

    async fn close(&self) -> Result<(), PublishError> {
        let Some(client) = self.client.lock().take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.flush_timeout, client.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PublishError::Close(e.to_string())),
            Err(_) => Err(PublishError::Close(format!(
                "flush timed out after {:?}",
                self.flush_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_server_is_rejected_before_connecting() {
        let options = ConnectOptions {
            servers: Some(vec!["nats://[bad".to_string()]),
            ..Default::default()
        };
        let err = NatsConnector::new().connect(&options).await.err().unwrap();
        assert_eq!(err.as_label(), "connection_invalid_server");
    }

    #[tokio::test]
    async fn missing_credentials_file_is_reported() {
        let options = ConnectOptions {
            user_credentials: Some("/nonexistent/runner.creds".to_string()),
            ..Default::default()
        };
        let err = NatsConnector::client_options(&options).await.err().unwrap();
        assert!(matches!(err, ConnectionError::Credentials(msg) if msg.contains("runner.creds")));
    }

    #[test]
    fn headers_are_copied() {
        let headers = Headers::from([("team".to_string(), "ops".to_string())]);
        let map = header_map(&headers);
        assert_eq!(map.get("team").map(|v| v.as_str()), Some("ops"));
    }
}
