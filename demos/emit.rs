//! # Example: emit
//!
//! Replays runner notifications read from stdin, one JSON object per line.
//! Lines with an `event` field go through `on_event`, every other line
//! through `on_status`.
//!
//! ```text
//! stdin (NDJSON) ──► Dispatcher ──► Registry ──► Session ──► NATS or memory
//! ```
//!
//! ## Run
//! ```text
//! # against a local server
//! RUNNER_NATS_SUBJECT_ID=demo cargo run --example emit < notifications.ndjson
//!
//! # without a server: print what would have been published
//! cargo run --example emit -- --memory < notifications.ndjson
//! ```
//!
//! Sample input:
//! ```text
//! {"runner_ident": "r1", "status": "starting"}
//! {"runner_ident": "r1", "event": "playbook_on_start", "counter": 1}
//! {"runner_ident": "r1", "status": "successful"}
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use runner_nats::{
    Dispatcher, EventKind, MemoryConnector, Payload, Registry, Resolver, RunnerSettings, identity_of,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let memory = std::env::args().any(|a| a == "--memory");
    let recorder = MemoryConnector::new();
    let hooks = if memory {
        Dispatcher::new(Arc::new(Registry::new(
            Resolver::from_process(),
            Arc::new(recorder.clone()),
        )))
    } else {
        Dispatcher::from_env()
    };

    let mut events = hooks.registry().bus().subscribe();
    let settings = RunnerSettings::default().with_subject_id("demo");

    for (n, line) in std::io::stdin().lock().lines().enumerate() {
        let line = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let payload: Payload = match serde_json::from_str(&line) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping line that is not a JSON object");
                continue;
            }
        };
        if identity_of(&payload).is_none() {
            warn!(line = n + 1, "skipping line without a string `runner_ident`");
            continue;
        }
        if payload.contains_key("event") {
            hooks.on_event(&settings, &payload);
        } else {
            hooks.on_status(&settings, &payload);
        }
    }

    let stopped = hooks.registry().shutdown_all();
    info!(stopped, "open sessions shut down");

    let mut created = 0;
    while let Ok(ev) = events.try_recv() {
        match ev.kind {
            EventKind::SessionCreated => created += 1,
            kind if ev.is_failure() => {
                warn!(?kind, identity = ?ev.identity, reason = ?ev.reason, "delivery problem");
            }
            _ => {}
        }
    }

    if memory {
        // Sessions released on a terminal status close on their own thread.
        if !recorder.wait_for_closes(created, Duration::from_secs(5)) {
            warn!(created, closed = recorder.close_count(), "some sessions did not close in time");
        }
        for msg in recorder.messages() {
            println!("{} {}", msg.subject, msg.json());
        }
    }
}
