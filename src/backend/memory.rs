//! # MemoryConnector: in-process backend
//!
//! Records every message instead of sending it. Use it for tests or demos.
//! Clones share the same recording.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::{Connection, Connector, Headers};
use crate::config::ConnectOptions;
use crate::error::{ConnectionError, PublishError};

/// One message captured by [`MemoryConnector`].
#[derive(Clone, Debug)]
pub struct RecordedMessage {
    /// Subject the message was published to.
    pub subject: String,
    /// Headers attached.
    pub headers: Headers,
    /// Raw body.
    pub payload: Bytes,
}

impl RecordedMessage {
    /// Decodes the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct State {
    messages: Vec<RecordedMessage>,
    connects: usize,
    closes: usize,
    last_options: Option<ConnectOptions>,
    fail_connect: Option<String>,
    connect_delay: Option<Duration>,
    rejected: Vec<String>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// In-memory backend recording published messages.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later connect fail with `reason`.
    pub fn fail_connects(&self, reason: impl Into<String>) {
        self.shared.state.lock().fail_connect = Some(reason.into());
    }

    /// Delays every later connect by `delay`.
    pub fn delay_connects(&self, delay: Duration) {
        self.shared.state.lock().connect_delay = Some(delay);
    }

    /// Makes publishes to `subject` fail with [`PublishError::Rejected`].
    pub fn reject_subject(&self, subject: impl Into<String>) {
        self.shared.state.lock().rejected.push(subject.into());
    }

    /// All recorded messages, in publish order.
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.shared.state.lock().messages.clone()
    }

    /// Recorded messages on one subject, in publish order.
    pub fn messages_on(&self, subject: &str) -> Vec<RecordedMessage> {
        self.shared
            .state
            .lock()
            .messages
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.shared.state.lock().connects
    }

    /// Number of closes.
    pub fn close_count(&self) -> usize {
        self.shared.state.lock().closes
    }

    /// Options passed to the most recent connect attempt.
    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.shared.state.lock().last_options.clone()
    }

    /// Blocks until at least `n` messages are recorded or `timeout` elapses.
    ///
    /// Returns `true` if the count was reached.
    pub fn wait_for_messages(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.messages.len() >= n)
    }

    /// Blocks until at least `n` closes happened or `timeout` elapses.
    pub fn wait_for_closes(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.closes >= n)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&State) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !done(&state) {
            if self
                .shared
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return done(&state);
            }
        }
        true
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let delay = {
            let mut state = self.shared.state.lock();
            state.last_options = Some(options.clone());
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.shared.state.lock();
        if let Some(reason) = &state.fail_connect {
            return Err(ConnectionError::Connect(reason.clone()));
        }
        state.connects += 1;
        self.shared.changed.notify_all();

        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            closed: Mutex::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    closed: Mutex<bool>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn publish(
        &self,
        subject: &str,
        headers: &Headers,
        payload: Bytes,
    ) -> Result<(), PublishError> {
        if *self.closed.lock() {
            return Err(PublishError::Rejected("connection closed".into()));
        }
        let mut state = self.shared.state.lock();
        if state.rejected.iter().any(|s| s == subject) {
            return Err(PublishError::Rejected(format!("subject {subject} rejected")));
        }
        state.messages.push(RecordedMessage {
            subject: subject.to_string(),
            headers: headers.clone(),
            payload,
        });
        self.shared.changed.notify_all();
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        *self.closed.lock() = true;
        let mut state = self.shared.state.lock();
        state.closes += 1;
        self.shared.changed.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_messages_and_closes() {
        let mem = MemoryConnector::new();
        let conn = mem.connect(&ConnectOptions::default()).await.unwrap();
        conn.publish("a.b", &Headers::new(), Bytes::from_static(b"{\"x\":1}"))
            .await
            .unwrap();
        conn.close().await.unwrap();

        assert_eq!(mem.connect_count(), 1);
        assert_eq!(mem.close_count(), 1);
        assert_eq!(mem.messages_on("a.b")[0].json()["x"], 1);

        let err = conn
            .publish("a.b", &Headers::new(), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "publish_rejected");
    }

    #[tokio::test]
    async fn failing_connects() {
        let mem = MemoryConnector::new();
        mem.fail_connects("refused");
        let err = mem.connect(&ConnectOptions::default()).await.err().unwrap();
        assert_eq!(err, ConnectionError::Connect("refused".into()));
        assert_eq!(mem.connect_count(), 0);
    }
}
