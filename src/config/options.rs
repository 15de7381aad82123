//! # Connection options and runner settings.
//!
//! [`ConnectOptions`] holds every connection knob as an `Option` so that unset
//! fields fall back to backend defaults. [`RunnerSettings`] is the typed view of
//! the runner's settings map; only the keys this crate reads are modeled.
//!
//! ## Merge rule
//! ```text
//! settings.nats_options ──merge(env)──► ConnectOptions
//!     field set in env        → env wins
//!     field unset in env      → settings value kept
//!     field unset in both     → None (backend default)
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Buffer applied to the pending queue while a session connects (1 MiB).
pub const PENDING_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection parameters for the messaging backend.
///
/// Durations are expressed in seconds (`f64`), matching the environment format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Server URLs (`nats://host:port`).
    pub servers: Option<Vec<String>>,
    /// Client display name.
    pub name: Option<String>,
    /// Verbose protocol acknowledgements.
    pub verbose: Option<bool>,
    /// Reconnect after a lost connection.
    pub allow_reconnect: Option<bool>,
    /// Connect timeout in seconds.
    pub connect_timeout: Option<f64>,
    /// Delay between reconnect attempts in seconds.
    pub reconnect_time_wait: Option<f64>,
    /// Reconnect attempt cap (negative = unlimited).
    pub max_reconnect_attempts: Option<i64>,
    /// Keep-alive ping interval in seconds.
    pub ping_interval: Option<f64>,
    /// Missed pings before the connection is considered stale.
    pub max_outstanding_pings: Option<u32>,
    /// Outbound queue capacity (messages).
    pub flusher_queue_size: Option<usize>,
    /// Username for user/password auth.
    pub user: Option<String>,
    /// Password for user/password auth.
    pub password: Option<String>,
    /// Token auth.
    pub token: Option<String>,
    /// Path to a `.creds` file.
    pub user_credentials: Option<String>,
    /// NKey seed.
    pub nkeys_seed: Option<String>,
    /// Pending buffer size in bytes (overridden at connect time).
    pub pending_size: Option<usize>,
    /// Flush timeout in seconds.
    pub flush_timeout: Option<f64>,
}

macro_rules! take_some {
    ($base:ident, $over:ident, $($field:ident),+ $(,)?) => {
        $( if $over.$field.is_some() { $base.$field = $over.$field; } )+
    };
}

impl ConnectOptions {
    /// Returns `self` with every field set in `overrides` replaced.
    #[must_use]
    pub fn merge(mut self, overrides: ConnectOptions) -> Self {
        take_some!(
            self,
            overrides,
            servers,
            name,
            verbose,
            allow_reconnect,
            connect_timeout,
            reconnect_time_wait,
            max_reconnect_attempts,
            ping_interval,
            max_outstanding_pings,
            flusher_queue_size,
            user,
            password,
            token,
            user_credentials,
            nkeys_seed,
            pending_size,
            flush_timeout,
        );
        self
    }

    /// Returns a copy with `pending_size` forced to [`PENDING_BUFFER_SIZE`].
    ///
    /// Applied right before connecting so slow connects do not drop messages.
    #[must_use]
    pub fn with_connect_buffer(mut self) -> Self {
        self.pending_size = Some(PENDING_BUFFER_SIZE);
        self
    }

    /// Connect timeout as a [`Duration`], if set and valid.
    #[inline]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.and_then(secs)
    }

    /// Reconnect wait as a [`Duration`], if set and valid.
    #[inline]
    pub fn reconnect_time_wait(&self) -> Option<Duration> {
        self.reconnect_time_wait.and_then(secs)
    }

    /// Ping interval as a [`Duration`], if set and valid.
    #[inline]
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval.and_then(secs)
    }

    /// Flush timeout as a [`Duration`], if set and valid.
    #[inline]
    pub fn flush_timeout(&self) -> Option<Duration> {
        self.flush_timeout.and_then(secs)
    }

    /// Reconnect cap: `None` means unlimited.
    #[inline]
    pub fn reconnect_limit(&self) -> Option<usize> {
        match self.max_reconnect_attempts {
            Some(n) if n >= 0 => Some(n as usize),
            _ => None,
        }
    }
}

fn secs(v: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(v).ok()
}

/// Typed view of the runner settings consumed by this crate.
///
/// Unknown keys in the source map are ignored.
///
/// ## Example
/// ```rust
/// use runner_nats::RunnerSettings;
///
/// let settings = RunnerSettings::from_value(serde_json::json!({
///     "nats_subject_id": "test",
///     "nats_headers": {"team": "ops"},
///     "idle_timeout": 30,
/// }))
/// .unwrap();
/// assert_eq!(settings.nats_subject_id.as_deref(), Some("test"));
/// assert_eq!(settings.nats_headers["team"], "ops");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Subject discriminator, used when the environment does not provide one.
    pub nats_subject_id: Option<String>,
    /// Connection options, overridden field-by-field by the environment.
    pub nats_options: Option<ConnectOptions>,
    /// Message headers, overridden key-by-key by the environment.
    pub nats_headers: BTreeMap<String, String>,
}

impl RunnerSettings {
    /// Builds settings from an arbitrary JSON settings object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Sets the discriminator.
    #[must_use]
    pub fn with_subject_id(mut self, id: impl Into<String>) -> Self {
        self.nats_subject_id = Some(id.into());
        self
    }

    /// Sets connection options.
    #[must_use]
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.nats_options = Some(options);
        self
    }

    /// Adds one header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.nats_headers.insert(key.into(), value.into());
        self
    }
}

/// Fully resolved configuration of one publishing session.
///
/// Built once per identity, never mutated after the session starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Connection parameters.
    pub options: ConnectOptions,
    /// Subject discriminator (non-empty).
    pub discriminator: String,
    /// Headers attached to every message.
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_overrides_and_keeps_the_rest() {
        let base = ConnectOptions {
            name: Some("settings".into()),
            connect_timeout: Some(2.0),
            ..Default::default()
        };
        let env = ConnectOptions {
            name: Some("env".into()),
            token: Some("t".into()),
            ..Default::default()
        };
        let merged = base.merge(env);
        assert_eq!(merged.name.as_deref(), Some("env"));
        assert_eq!(merged.token.as_deref(), Some("t"));
        assert_eq!(merged.connect_timeout, Some(2.0));
        assert!(merged.servers.is_none());
    }

    #[test]
    fn connect_buffer_overrides_pending_size() {
        let opts = ConnectOptions {
            pending_size: Some(10),
            ..Default::default()
        }
        .with_connect_buffer();
        assert_eq!(opts.pending_size, Some(PENDING_BUFFER_SIZE));
    }

    #[test]
    fn durations_reject_negative_seconds() {
        let opts = ConnectOptions {
            connect_timeout: Some(-1.0),
            ping_interval: Some(0.5),
            ..Default::default()
        };
        assert_eq!(opts.connect_timeout(), None);
        assert_eq!(opts.ping_interval(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn negative_reconnect_attempts_mean_unlimited() {
        let mut opts = ConnectOptions {
            max_reconnect_attempts: Some(-1),
            ..Default::default()
        };
        assert_eq!(opts.reconnect_limit(), None);
        opts.max_reconnect_attempts = Some(3);
        assert_eq!(opts.reconnect_limit(), Some(3));
    }

    #[test]
    fn settings_ignore_unknown_keys() {
        let settings = RunnerSettings::from_value(serde_json::json!({
            "suppress_ansible_output": true,
            "nats_options": {"servers": ["nats://a:4222"], "verbose": true},
        }))
        .unwrap();
        let opts = settings.nats_options.unwrap();
        assert_eq!(opts.servers, Some(vec!["nats://a:4222".to_string()]));
        assert_eq!(opts.verbose, Some(true));
        assert!(settings.nats_subject_id.is_none());
    }
}
