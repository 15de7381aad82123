//! # Runner hooks: the synchronous entry points.
//!
//! [`Dispatcher::on_status`] and [`Dispatcher::on_event`] are called by the
//! runner on its own worker threads. Both only resolve a session and enqueue
//! work, so they return in bounded time and never surface network errors.
//!
//! ## Flow
//! ```text
//! on_status(settings, payload)
//!   ├─► identity = payload.runner_ident      (missing → panic in debug, warn in release)
//!   ├─► registry.resolve(identity, settings) (None → return)
//!   ├─► session.submit_publish(Status, payload)
//!   └─► terminal status?
//!         ├─► session.submit_shutdown()      (queued after the publish above)
//!         └─► registry.release(identity)
//!
//! on_event(settings, payload)
//!   ├─► same resolve
//!   └─► session.submit_publish(Event, payload)
//! ```

use std::sync::Arc;

use tracing::warn;

use crate::backend::NatsConnector;
use crate::config::{Resolver, RunnerSettings};
use crate::core::{
    IDENTITY_FIELD, MessageKind, Payload, Registry, has_terminal_status, identity_of,
};
use crate::events::{Event, EventKind};

/// Entry points wired into the runner's status and event callbacks.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Creates a dispatcher over an existing registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Creates a dispatcher publishing to NATS, configured from the process environment.
    ///
    /// The environment is captured once, here. Variables changed afterwards
    /// are not seen by sessions created later; build a new dispatcher to pick
    /// them up.
    pub fn from_env() -> Self {
        Self::new(Arc::new(Registry::new(
            Resolver::from_process(),
            Arc::new(NatsConnector::new()),
        )))
    }

    /// Registry backing this dispatcher.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handles one status change.
    pub fn on_status(&self, settings: &RunnerSettings, payload: &Payload) {
        let Some(identity) = Self::identity(payload, "status") else {
            return;
        };
        let Some(session) = self.registry.resolve(identity, settings) else {
            return;
        };

        let _ = session.submit_publish(MessageKind::Status, payload);

        if has_terminal_status(payload) {
            let mut stop = session.submit_shutdown();
            if let Some(Err(err)) = stop.try_outcome() {
                warn!(identity, error = %err, "shutdown could not be submitted");
                self.registry.bus().publish(
                    Event::new(EventKind::ShutdownFailed)
                        .with_identity(identity)
                        .with_reason(err.as_label()),
                );
            }
            self.registry.release(identity);
        }
    }

    /// Handles one structured event. Never triggers shutdown.
    pub fn on_event(&self, settings: &RunnerSettings, payload: &Payload) {
        let Some(identity) = Self::identity(payload, "event") else {
            return;
        };
        if let Some(session) = self.registry.resolve(identity, settings) {
            let _ = session.submit_publish(MessageKind::Event, payload);
        }
    }

    fn identity<'a>(payload: &'a Payload, hook: &str) -> Option<&'a str> {
        let identity = identity_of(payload);
        if identity.is_none() {
            if cfg!(debug_assertions) {
                panic!("{hook} payload has no string `{IDENTITY_FIELD}` field");
            }
            warn!(hook, "payload has no runner identity, message dropped");
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backend::MemoryConnector;
    use crate::config::Environment;

    const WAIT: Duration = Duration::from_secs(5);

    fn dispatcher(mem: &MemoryConnector) -> Dispatcher {
        Dispatcher::new(Arc::new(Registry::new(
            Resolver::new(Environment::default()),
            Arc::new(mem.clone()),
        )))
    }

    fn payload(v: serde_json::Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    fn settings() -> RunnerSettings {
        RunnerSettings::default().with_subject_id("test")
    }

    #[test]
    fn non_terminal_status_keeps_session() {
        let mem = MemoryConnector::new();
        let d = dispatcher(&mem);
        for status in ["starting", "running"] {
            d.on_status(&settings(), &payload(json!({"runner_ident": "r1", "status": status})));
        }
        assert!(d.registry().contains("r1"));
        assert!(mem.wait_for_messages(2, WAIT));
        assert_eq!(mem.close_count(), 0);
        d.registry().shutdown_all();
    }

    #[test]
    fn each_terminal_status_tears_down_once() {
        for status in ["canceled", "successful", "timeout", "failed"] {
            let mem = MemoryConnector::new();
            let d = dispatcher(&mem);
            let mut rx = d.registry().bus().subscribe();

            d.on_status(&settings(), &payload(json!({"runner_ident": "r1", "status": status})));

            assert!(!d.registry().contains("r1"), "{status}");
            assert!(mem.wait_for_closes(1, WAIT), "{status}");
            assert_eq!(mem.close_count(), 1, "{status}");
            let released = std::iter::from_fn(|| rx.try_recv().ok())
                .filter(|e| e.kind == EventKind::SessionReleased)
                .count();
            assert_eq!(released, 1, "{status}");
        }
    }

    #[test]
    fn events_never_shut_down() {
        let mem = MemoryConnector::new();
        let d = dispatcher(&mem);
        d.on_event(&settings(), &payload(json!({"runner_ident": "r1", "status": "failed"})));
        assert!(d.registry().contains("r1"));
        assert!(mem.wait_for_messages(1, WAIT));
        assert_eq!(mem.messages()[0].subject, "pub.ansible.runner.test.r1.event");
        d.registry().shutdown_all();
    }

    #[test]
    fn disabled_feature_publishes_nothing() {
        let mem = MemoryConnector::new();
        let d = dispatcher(&mem);
        for _ in 0..3 {
            d.on_status(
                &RunnerSettings::default(),
                &payload(json!({"runner_ident": "r1", "status": "successful"})),
            );
            d.on_event(&RunnerSettings::default(), &payload(json!({"runner_ident": "r1"})));
        }
        assert!(d.registry().is_empty());
        assert_eq!(mem.connect_count(), 0);
        assert!(mem.messages().is_empty());
    }

    #[test]
    fn nul_in_identity_does_not_escape_the_hook() {
        let mem = MemoryConnector::new();
        let d = dispatcher(&mem);
        let id = "r\u{0}1";
        d.on_status(&settings(), &payload(json!({"runner_ident": id, "status": "running"})));
        assert!(d.registry().contains(id));
        assert!(mem.wait_for_messages(1, WAIT));
        assert_eq!(mem.messages()[0].json()["runner_ident"], id);
        assert_eq!(d.registry().shutdown_all(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "runner_ident")]
    fn missing_identity_fails_loudly_in_debug() {
        let mem = MemoryConnector::new();
        dispatcher(&mem).on_status(&settings(), &payload(json!({"status": "running"})));
    }
}
