//! # runner-nats
//!
//! **runner-nats** publishes the status and event notifications of an
//! automation runner to NATS. Each runner execution gets one subject
//! namespace, one lazily created connection and one background thread;
//! the runner's own threads only enqueue and return.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   runner worker threads (sync callbacks)
//!     │ on_status(settings, payload)     │ on_event(settings, payload)
//!     ▼                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher                                                       │
//! │  - extracts payload.runner_ident                                  │
//! │  - terminal status → submit_shutdown + release                    │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (identity → Session, one lock)                          │
//! │  - Resolver: environment + RunnerSettings → SessionConfig         │
//! │  - creates at most one Session per identity                       │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Session  │       │ Session  │       │ Session  │   mpsc queue (FIFO)
//!   │ thread + │       │ thread + │       │ thread + │   current-thread runtime
//!   │ runtime  │       │ runtime  │       │ runtime  │
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        ▼                  ▼                  ▼
//!   Connector/Connection (NATS or in-memory)
//!        publish pub.ansible.runner.<discriminator>.<identity>.<status|event>
//!
//!   Lifecycle events (created, connected, failures, closed, released) ──► Bus
//! ```
//!
//! ### Lifecycle
//! ```text
//! first notification for identity ──► Registry::resolve ──► Session::start
//!                                                             └─► connect (background)
//! every notification               ──► Session::submit_publish (enqueue, return)
//! terminal status                  ──► submit_publish ─► submit_shutdown ─► release
//!                                                             └─► close after queued publishes
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types                            |
//! |-------------------|--------------------------------------------------------------|--------------------------------------|
//! | **Hooks**         | Runner callbacks, enqueue only.                              | [`Dispatcher`]                       |
//! | **Registry**      | One session per identity, explicit and injectable.           | [`Registry`]                         |
//! | **Sessions**      | Background connection with FIFO publish and graceful close.  | [`Session`], [`Completion`]          |
//! | **Configuration** | Environment over runner settings.                            | [`Resolver`], [`RunnerSettings`]     |
//! | **Backends**      | NATS client or in-memory recorder.                           | [`NatsConnector`], [`MemoryConnector`] |
//! | **Events**        | Non-blocking lifecycle feed.                                 | [`Bus`], [`Event`]                   |
//! | **Errors**        | Typed errors with stable labels.                             | [`SessionError`], [`ConfigError`]    |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use runner_nats::{Dispatcher, Environment, MemoryConnector, Registry, Resolver, RunnerSettings};
//!
//! let backend = MemoryConnector::new();
//! let registry = Registry::new(Resolver::new(Environment::default()), Arc::new(backend.clone()));
//! let hooks = Dispatcher::new(Arc::new(registry));
//!
//! let settings = RunnerSettings::default().with_subject_id("test");
//! for status in ["starting", "running", "successful"] {
//!     let payload = serde_json::json!({"runner_ident": "abc123", "status": status});
//!     hooks.on_status(&settings, payload.as_object().unwrap());
//! }
//!
//! assert!(backend.wait_for_closes(1, Duration::from_secs(5)));
//! assert_eq!(backend.messages_on("pub.ansible.runner.test.abc123.status").len(), 3);
//! ```

pub mod backend;
pub mod config;
mod core;
mod error;
mod events;
mod hooks;

// ---- Public re-exports ----

pub use backend::{MemoryConnector, NatsConnector};
pub use config::{
    ConnectOptions, Environment, PENDING_BUFFER_SIZE, Resolver, RunnerSettings, SessionConfig,
};
pub use crate::core::{
    Completion, IDENTITY_FIELD, MessageKind, Payload, Registry, STATUS_FIELD, SUBJECT_PREFIX,
    Session, TERMINAL_STATUSES, has_terminal_status, identity_of, is_terminal, subject_for,
};
pub use error::{ConfigError, ConnectionError, PublishError, SessionError};
pub use events::{Bus, DEFAULT_BUS_CAPACITY, Event, EventKind};
pub use hooks::Dispatcher;
