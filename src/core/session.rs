//! # Session: one connection, one background thread, one FIFO queue.
//!
//! A [`Session`] publishes every message of one runner identity. It owns a
//! dedicated OS thread that hosts a current-thread tokio runtime; callers on
//! any thread hand work over through an unbounded mpsc queue and get a
//! [`Completion`] back immediately.
//!
//! ## Architecture
//! ```text
//! runner thread A ─┐ submit_publish / submit_shutdown
//! runner thread B ─┼──────────► [mpsc queue] ──► SessionLoop (nats-session-<identity>)
//! runner thread C ─┘   (enqueue only)                │
//!                                                    ├─► connect (non-blocking)
//!                                                    │     while pending: backlog ≤ 1 MiB
//!                                                    ├─► publish ─► Connection::publish
//!                                                    └─► shutdown ─► Connection::close ─► stop
//! ```
//!
//! ## Rules
//! - Commands execute **serially in submission order**; a shutdown therefore
//!   runs after every publish queued before it.
//! - A failed publish only fails its own completion; the loop continues.
//! - A failed connect is logged and recorded; later publishes fail with
//!   [`PublishError::NotConnected`]; shutdown still stops the loop.
//! - When every [`Session`] handle is dropped the queue closes, the loop closes
//!   the connection and exits.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::completion::{Completion, Reply};
use super::message::{MessageKind, Payload, identity_of, subject_for};
use crate::backend::{Connection, Connector, Headers};
use crate::config::{PENDING_BUFFER_SIZE, SessionConfig};
use crate::error::{ConnectionError, PublishError, SessionError};
use crate::events::{Bus, Event, EventKind};

/// Work item handed to the background loop.
enum Command {
    Publish {
        subject: String,
        payload: Bytes,
        reply: Reply,
    },
    Shutdown {
        reply: Reply,
    },
}

impl Command {
    fn weight(&self) -> usize {
        match self {
            Command::Publish { payload, .. } => payload.len(),
            Command::Shutdown { .. } => 0,
        }
    }
}

/// State shared between handles and the background loop.
struct Shared {
    identity: Arc<str>,
    stopped: CancellationToken,
    last_error: Mutex<Option<SessionError>>,
    bus: Bus,
}

impl Shared {
    fn record(&self, err: &SessionError) {
        *self.last_error.lock() = Some(err.clone());
    }
}

/// Publishing session for one runner identity.
pub struct Session {
    config: SessionConfig,
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl Session {
    /// Configures a session and starts its background thread.
    ///
    /// Returns the session and the thread handle. The connect starts on the
    /// background thread; this call never waits for the network.
    pub fn start(
        identity: impl Into<Arc<str>>,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        bus: Bus,
    ) -> Result<(Arc<Session>, JoinHandle<()>), SessionError> {
        let shared = Arc::new(Shared {
            identity: identity.into(),
            stopped: CancellationToken::new(),
            last_error: Mutex::new(None),
            bus,
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = SessionLoop {
            shared: Arc::clone(&shared),
            config: config.clone(),
            connector,
        };
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(thread_name(&shared.identity))
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(worker.run(rx)),
                    Err(e) => {
                        let err = SessionError::Runtime(e.to_string());
                        error!(identity = %thread_shared.identity, error = %err, "session runtime failed");
                        thread_shared.record(&err);
                    }
                }
                thread_shared.stopped.cancel();
            })
            .map_err(|e| SessionError::Runtime(e.to_string()))?;

        Ok((Arc::new(Session { config, tx, shared }), handle))
    }

    /// Runner identity served by this session.
    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    /// Subject discriminator.
    pub fn discriminator(&self) -> &str {
        &self.config.discriminator
    }

    /// Headers attached to every message.
    pub fn headers(&self) -> &Headers {
        &self.config.headers
    }

    /// Full configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subject for a message of `kind` about `identity`.
    pub fn subject(&self, kind: MessageKind, identity: &str) -> String {
        subject_for(&self.config.discriminator, identity, kind)
    }

    /// Queues a publish of `payload` and returns immediately.
    ///
    /// The identity token of the subject comes from the payload's identity
    /// field, or from the session when the payload has none.
    ///
    /// The payload is serialized on the calling thread. A JSON map always
    /// serializes, so [`PublishError::Serialize`] is only reported if
    /// `serde_json` itself fails.
    pub fn submit_publish(&self, kind: MessageKind, payload: &Payload) -> Completion {
        let identity = identity_of(payload).unwrap_or(self.identity());
        let subject = self.subject(kind, identity);

        let payload = match serde_json::to_vec(payload) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                let err = SessionError::from(PublishError::Serialize(e.to_string()));
                warn!(identity = %self.shared.identity, %subject, error = %err, "payload not serializable");
                self.shared.bus.publish(
                    Event::new(EventKind::PublishFailed)
                        .with_identity(Arc::clone(&self.shared.identity))
                        .with_subject(subject)
                        .with_reason(err.as_label()),
                );
                return Completion::ready(Err(err));
            }
        };

        let (reply, completion) = Completion::pending();
        self.enqueue(Command::Publish {
            subject,
            payload,
            reply,
        });
        completion
    }

    /// Queues a close of the connection; the loop stops once it ran.
    pub fn submit_shutdown(&self) -> Completion {
        let (reply, completion) = Completion::pending();
        self.enqueue(Command::Shutdown { reply });
        completion
    }

    /// True once the background loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.is_cancelled()
    }

    /// Resolves once the background loop has exited.
    pub async fn stopped(&self) {
        self.shared.stopped.cancelled().await;
    }

    /// Most recent connect/publish/close failure, if any.
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.last_error.lock().clone()
    }

    fn enqueue(&self, cmd: Command) {
        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(cmd) {
            let reply = match cmd {
                Command::Publish { reply, .. } | Command::Shutdown { reply } => reply,
            };
            let _ = reply.send(Err(SessionError::Stopped));
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.shared.identity)
            .field("discriminator", &self.config.discriminator)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Background half of a session; runs on the session thread only.
struct SessionLoop {
    shared: Arc<Shared>,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
}

impl SessionLoop {
    /// Connects, then drains the queue until shutdown or until every sender is gone.
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let options = self.config.options.clone().with_connect_buffer();
        let limit = options.pending_size.unwrap_or(PENDING_BUFFER_SIZE);

        let connect = AssertUnwindSafe(self.connector.connect(&options)).catch_unwind();
        tokio::pin!(connect);

        let mut backlog: VecDeque<Command> = VecDeque::new();
        let mut buffered = 0usize;
        let mut senders_gone = false;

        let conn = loop {
            tokio::select! {
                biased;
                res = &mut connect => {
                    let res = res.unwrap_or_else(|panic| {
                        Err(ConnectionError::Connect(panic_message(panic.as_ref())))
                    });
                    break self.on_connect(res);
                }
                cmd = rx.recv(), if !senders_gone => match cmd {
                    Some(cmd) => {
                        let size = buffered + cmd.weight();
                        if size > limit {
                            if let Command::Publish { subject, reply, .. } = cmd {
                                let err = PublishError::PendingOverflow { size, limit }.into();
                                self.publish_failed(&subject, &err);
                                let _ = reply.send(Err(err));
                            }
                        } else {
                            buffered = size;
                            backlog.push_back(cmd);
                        }
                    }
                    None => senders_gone = true,
                },
            }
        };

        for cmd in backlog {
            if self.execute(conn.as_deref(), cmd, &mut rx).await.is_break() {
                return;
            }
        }
        if !senders_gone {
            while let Some(cmd) = rx.recv().await {
                if self.execute(conn.as_deref(), cmd, &mut rx).await.is_break() {
                    return;
                }
            }
        }

        debug!(identity = %self.shared.identity, "all session handles dropped, closing");
        let _ = self.close(conn.as_deref()).await;
    }

    fn on_connect(
        &self,
        res: Result<Box<dyn Connection>, ConnectionError>,
    ) -> Option<Box<dyn Connection>> {
        match res {
            Ok(conn) => {
                debug!(identity = %self.shared.identity, backend = self.connector.name(), "session connected");
                self.shared
                    .bus
                    .publish(Event::new(EventKind::Connected).with_identity(Arc::clone(&self.shared.identity)));
                Some(conn)
            }
            Err(e) => {
                let err = SessionError::from(e);
                error!(identity = %self.shared.identity, error = %err, "session connect failed");
                self.shared.record(&err);
                self.shared.bus.publish(
                    Event::new(EventKind::ConnectFailed)
                        .with_identity(Arc::clone(&self.shared.identity))
                        .with_reason(err.as_label()),
                );
                None
            }
        }
    }

    async fn execute(
        &self,
        conn: Option<&dyn Connection>,
        cmd: Command,
        rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> ControlFlow<()> {
        match cmd {
            Command::Publish {
                subject,
                payload,
                reply,
            } => {
                let res = self.publish(conn, &subject, payload).await;
                if let Err(err) = &res {
                    self.publish_failed(&subject, err);
                }
                let _ = reply.send(res);
                ControlFlow::Continue(())
            }
            Command::Shutdown { reply } => {
                rx.close();
                let res = self.close(conn).await;
                let _ = reply.send(res);
                ControlFlow::Break(())
            }
        }
    }

    async fn publish(
        &self,
        conn: Option<&dyn Connection>,
        subject: &str,
        payload: Bytes,
    ) -> Result<(), SessionError> {
        let Some(conn) = conn else {
            return Err(PublishError::NotConnected.into());
        };
        AssertUnwindSafe(conn.publish(subject, &self.config.headers, payload))
            .catch_unwind()
            .await
            .map_err(|panic| SessionError::Panicked(panic_message(panic.as_ref())))?
            .map_err(SessionError::from)
    }

    async fn close(&self, conn: Option<&dyn Connection>) -> Result<(), SessionError> {
        let res = match conn {
            Some(conn) => AssertUnwindSafe(conn.close())
                .catch_unwind()
                .await
                .map_err(|panic| SessionError::Panicked(panic_message(panic.as_ref())))
                .and_then(|r| r.map_err(SessionError::from)),
            None => Ok(()),
        };

        let mut ev = Event::new(EventKind::SessionClosed).with_identity(Arc::clone(&self.shared.identity));
        match &res {
            Ok(()) => debug!(identity = %self.shared.identity, "session closed"),
            Err(err) => {
                warn!(identity = %self.shared.identity, error = %err, "session close failed");
                self.shared.record(err);
                ev = ev.with_reason(err.as_label());
            }
        }
        self.shared.bus.publish(ev);
        res
    }

    fn publish_failed(&self, subject: &str, err: &SessionError) {
        warn!(identity = %self.shared.identity, %subject, error = %err, "publish failed");
        self.shared.record(err);
        self.shared.bus.publish(
            Event::new(EventKind::PublishFailed)
                .with_identity(Arc::clone(&self.shared.identity))
                .with_subject(subject)
                .with_reason(err.as_label()),
        );
    }
}

/// Thread name for a session; interior NULs are not allowed in thread names.
fn thread_name(identity: &str) -> String {
    format!("nats-session-{}", identity.replace('\0', "_"))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
