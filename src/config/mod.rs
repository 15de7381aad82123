//! Session configuration: connection options, runner settings and the resolver
//! that merges them with the environment.
//!
//! ## Contents
//! - [`ConnectOptions`], [`RunnerSettings`], [`SessionConfig`] data model
//! - [`Environment`] snapshot of process variables
//! - [`Resolver`] precedence rules (environment over settings)

mod env;
mod options;
mod resolver;

pub use env::{Environment, parse_flag, parse_headers, parse_servers};
pub use options::{ConnectOptions, PENDING_BUFFER_SIZE, RunnerSettings, SessionConfig};
pub use resolver::{HEADERS_VAR, HOSTNAME_SENTINEL, Resolver, SUBJECT_ID_VAR};
