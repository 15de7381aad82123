//! # Session registry: one publishing session per runner identity.
//!
//! The registry is an explicit object (no process-wide singleton); whoever wires
//! the runner hooks owns it, and tests build independent instances.
//!
//! ## Architecture
//! ```text
//! resolve(identity, settings)
//!     ├─► no discriminator        → None (feature disabled for the run)
//!     └─► lock
//!           ├─► entry exists      → clone session
//!           └─► absent            → Resolver::resolve → Session::start → insert
//!         unlock                    (connect proceeds on the session thread)
//!
//! release(identity) → lock → remove entry → unlock (thread handle detached)
//! ```
//!
//! ## Rules
//! - At most one session per identity, even when first calls race.
//! - The lock covers map mutation and session start only, never network I/O.
//! - Each entry holds the session and its thread handle together, so an
//!   identity has both or neither.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::session::Session;
use crate::backend::Connector;
use crate::config::{Resolver, RunnerSettings};
use crate::events::{Bus, Event, EventKind};

/// Registry entry: the session and the thread running its loop.
struct Entry {
    session: Arc<Session>,
    thread: JoinHandle<()>,
}

/// Table of active publishing sessions keyed by runner identity.
pub struct Registry {
    sessions: Mutex<HashMap<String, Entry>>,
    resolver: Resolver,
    connector: Arc<dyn Connector>,
    bus: Bus,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new(resolver: Resolver, connector: Arc<dyn Connector>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            resolver,
            connector,
            bus: Bus::default(),
        }
    }

    /// Replaces the event bus (before any session is created).
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Event bus shared with every session.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Options resolver in use.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Returns the session for `identity`, creating it on first use.
    ///
    /// Returns `None` when no discriminator resolves for `settings`, when the
    /// configuration is invalid, or when the session thread cannot start.
    pub fn resolve(&self, identity: &str, settings: &RunnerSettings) -> Option<Arc<Session>> {
        if self.resolver.discriminator(settings).is_none() {
            debug!(identity, "no subject discriminator, nats publishing skipped");
            return None;
        }

        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get(identity) {
            return Some(Arc::clone(&entry.session));
        }

        let config = match self.resolver.resolve(settings) {
            Ok(Some(config)) => config,
            Ok(None) => return None,
            Err(err) => {
                error!(identity, label = err.as_label(), error = %err, "invalid nats configuration, publishing disabled for this run");
                return None;
            }
        };
        let discriminator = config.discriminator.clone();

        match Session::start(identity, config, Arc::clone(&self.connector), self.bus.clone()) {
            Ok((session, thread)) => {
                sessions.insert(
                    identity.to_string(),
                    Entry {
                        session: Arc::clone(&session),
                        thread,
                    },
                );
                drop(sessions);

                debug!(identity, %discriminator, "session created");
                self.bus.publish(
                    Event::new(EventKind::SessionCreated)
                        .with_identity(identity)
                        .with_reason(discriminator),
                );
                Some(session)
            }
            Err(err) => {
                error!(identity, error = %err, "session could not start");
                None
            }
        }
    }

    /// Returns the session for `identity` without creating one.
    pub fn get(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .get(identity)
            .map(|e| Arc::clone(&e.session))
    }

    /// Removes `identity`; returns `false` if it was absent.
    ///
    /// Does not wait for the session: shutdown must be submitted beforehand.
    /// The thread handle is dropped, detaching the thread until its loop exits.
    pub fn release(&self, identity: &str) -> bool {
        let removed = self.sessions.lock().remove(identity);
        match removed {
            Some(_entry) => {
                debug!(identity, "session released");
                self.bus
                    .publish(Event::new(EventKind::SessionReleased).with_identity(identity));
                true
            }
            None => false,
        }
    }

    /// Drops every entry without requesting shutdown.
    ///
    /// Intended for test isolation only. Sessions still referenced elsewhere keep
    /// their connection and thread alive; use [`Registry::shutdown_all`] for a
    /// clean teardown.
    pub fn clear(&self) {
        let drained: Vec<(String, Entry)> = self.sessions.lock().drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "registry cleared without shutdown");
        }
    }

    /// Requests shutdown of every session and joins their threads.
    ///
    /// Blocks until every loop exited; must not be called from async code.
    /// Returns the number of sessions stopped.
    pub fn shutdown_all(&self) -> usize {
        let drained: Vec<(String, Entry)> = self.sessions.lock().drain().collect();

        for (_, entry) in &drained {
            let _ = entry.session.submit_shutdown();
        }

        let count = drained.len();
        for (identity, entry) in drained {
            if entry.thread.join().is_err() {
                error!(identity, "session thread panicked");
            }
            self.bus
                .publish(Event::new(EventKind::SessionReleased).with_identity(identity));
        }
        count
    }

    /// True if `identity` has an active entry.
    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.lock().contains_key(identity)
    }

    /// Number of active entries.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Sorted identities of active entries.
    pub fn identities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
