//! # Options resolver: environment + runner settings → [`SessionConfig`].
//!
//! ## Precedence
//! ```text
//! discriminator: RUNNER_NATS_SUBJECT_ID ("hostname" → host name) ─► settings.nats_subject_id
//! options:       settings.nats_options  ◄── overridden by ── RUNNER_NATS_* fields
//! headers:       settings.nats_headers  ◄── overridden by ── RUNNER_NATS_HEADERS items
//! ```
//!
//! ## Rules
//! - An absent or empty discriminator disables the feature (not an error).
//! - A malformed numeric variable is fatal for the run's configuration.
//! - A malformed header item is logged and dropped; other items survive.

use std::collections::BTreeMap;

use tracing::{error, warn};

use super::env::{self, Environment};
use super::options::{ConnectOptions, RunnerSettings, SessionConfig};
use crate::error::ConfigError;

/// Environment variable selecting the discriminator.
pub const SUBJECT_ID_VAR: &str = "RUNNER_NATS_SUBJECT_ID";
/// Environment variable carrying extra headers.
pub const HEADERS_VAR: &str = "RUNNER_NATS_HEADERS";
/// Discriminator value replaced by the local host name.
pub const HOSTNAME_SENTINEL: &str = "hostname";

/// Resolves session configuration from an [`Environment`] snapshot.
#[derive(Clone, Debug, Default)]
pub struct Resolver {
    env: Environment,
}

impl Resolver {
    /// Creates a resolver over the given snapshot.
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Creates a resolver over the current process environment.
    pub fn from_process() -> Self {
        Self::new(Environment::from_process())
    }

    /// Returns the snapshot in use.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Resolves the discriminator, or `None` when the feature is disabled.
    pub fn discriminator(&self, settings: &RunnerSettings) -> Option<String> {
        match self.env.get(SUBJECT_ID_VAR) {
            Some(HOSTNAME_SENTINEL) => Some(local_hostname()),
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => settings
                .nats_subject_id
                .clone()
                .filter(|id| !id.is_empty()),
        }
    }

    /// Resolves headers: settings headers overridden by environment items.
    pub fn headers(&self, settings: &RunnerSettings) -> BTreeMap<String, String> {
        let mut headers = settings.nats_headers.clone();
        let Some(raw) = self.env.get(HEADERS_VAR).filter(|v| !v.is_empty()) else {
            return headers;
        };

        let (pairs, errors) = env::parse_headers(raw);
        for err in errors {
            error!(label = err.as_label(), error = %err, "dropping invalid header");
        }
        headers.extend(pairs);
        headers
    }

    /// Resolves connection options: settings options overridden by environment.
    pub fn options(&self, settings: &RunnerSettings) -> Result<ConnectOptions, ConfigError> {
        let env = &self.env;
        let extras = ConnectOptions {
            servers: env.get("RUNNER_NATS_SERVERS").map(env::parse_servers),
            name: env.string("RUNNER_NATS_CLIENT_NAME"),
            verbose: env.flag("RUNNER_NATS_CLIENT_VERBOSE"),
            allow_reconnect: env.flag("RUNNER_NATS_ALLOW_RECONNECT"),
            connect_timeout: env.number("RUNNER_NATS_CONNECT_TIMEOUT")?,
            reconnect_time_wait: env.number("RUNNER_NATS_RECONNECT_TIME_WAIT")?,
            max_reconnect_attempts: env.number("RUNNER_NATS_MAX_RECONNECT_ATTEMPTS")?,
            ping_interval: env.number("RUNNER_NATS_PING_INTERVAL")?,
            max_outstanding_pings: env.number("RUNNER_MAX_OUTSTANDING_PINGS")?,
            flusher_queue_size: env.number("RUNNER_NATS_FLUSHER_QUEUE_SIZE")?,
            user: env.string("RUNNER_NATS_USERNAME"),
            password: env.string("RUNNER_NATS_PASSWORD"),
            token: env.string("RUNNER_NATS_TOKEN"),
            user_credentials: env.string("RUNNER_NATS_USER_CREDENTIALS"),
            nkeys_seed: env.string("RUNNER_NATS_NKEYS_SEED"),
            pending_size: env.number("RUNNER_NATS_PENDING_SIZE")?,
            flush_timeout: env.number("RUNNER_NATS_FLUSH_TIMEOUT")?,
        };

        let base = settings.nats_options.clone().unwrap_or_default();
        Ok(base.merge(extras))
    }

    /// Resolves the full session configuration.
    ///
    /// Returns `Ok(None)` when no discriminator is available.
    pub fn resolve(&self, settings: &RunnerSettings) -> Result<Option<SessionConfig>, ConfigError> {
        let Some(discriminator) = self.discriminator(settings) else {
            return Ok(None);
        };
        let options = self.options(settings)?;
        Ok(Some(SessionConfig {
            options,
            discriminator,
            headers: self.headers(settings),
        }))
    }
}

/// Local host name with dots replaced, so it fits in one subject token.
fn local_hostname() -> String {
    let name = gethostname::gethostname();
    let name = name.to_string_lossy();
    if name.is_empty() {
        warn!("host name is empty, using \"unknown\"");
        return "unknown".to_string();
    }
    name.replace('.', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(pairs: &[(&str, &str)]) -> Resolver {
        Resolver::new(Environment::from_pairs(pairs.iter().copied()))
    }

    #[test]
    fn discriminator_absent_disables_feature() {
        let r = resolver(&[]);
        assert_eq!(r.discriminator(&RunnerSettings::default()), None);
        assert_eq!(r.resolve(&RunnerSettings::default()), Ok(None));
    }

    #[test]
    fn empty_discriminator_disables_feature() {
        let r = resolver(&[(SUBJECT_ID_VAR, "")]);
        let settings = RunnerSettings::default().with_subject_id("");
        assert_eq!(r.discriminator(&settings), None);
    }

    #[test]
    fn env_discriminator_wins_over_settings() {
        let r = resolver(&[(SUBJECT_ID_VAR, "from-env")]);
        let settings = RunnerSettings::default().with_subject_id("from-settings");
        assert_eq!(r.discriminator(&settings).as_deref(), Some("from-env"));

        let r = resolver(&[]);
        assert_eq!(r.discriminator(&settings).as_deref(), Some("from-settings"));
    }

    #[test]
    fn hostname_discriminator_has_no_dots() {
        let r = resolver(&[(SUBJECT_ID_VAR, HOSTNAME_SENTINEL)]);
        let id = r.discriminator(&RunnerSettings::default()).unwrap();
        assert!(!id.is_empty());
        assert!(!id.contains('.'));
    }

    #[test]
    fn env_headers_override_settings_headers() {
        let r = resolver(&[(HEADERS_VAR, "team=env,region=eu,bad")]);
        let settings = RunnerSettings::default()
            .with_header("team", "settings")
            .with_header("owner", "alice");
        let headers = r.headers(&settings);
        assert_eq!(headers["team"], "env");
        assert_eq!(headers["region"], "eu");
        assert_eq!(headers["owner"], "alice");
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn env_options_override_settings_options() {
        let r = resolver(&[
            ("RUNNER_NATS_SERVERS", "nats://a:4222, nats://b:4222"),
            ("RUNNER_NATS_CONNECT_TIMEOUT", "1.5"),
            ("RUNNER_NATS_ALLOW_RECONNECT", "no"),
            ("RUNNER_MAX_OUTSTANDING_PINGS", "4"),
        ]);
        let settings = RunnerSettings::default().with_options(ConnectOptions {
            name: Some("runner".into()),
            connect_timeout: Some(9.0),
            ..Default::default()
        });
        let opts = r.options(&settings).unwrap();
        assert_eq!(
            opts.servers,
            Some(vec!["nats://a:4222".to_string(), "nats://b:4222".to_string()])
        );
        assert_eq!(opts.connect_timeout, Some(1.5));
        assert_eq!(opts.allow_reconnect, Some(false));
        assert_eq!(opts.max_outstanding_pings, Some(4));
        assert_eq!(opts.name.as_deref(), Some("runner"));
        assert_eq!(opts.token, None);
    }

    #[test]
    fn malformed_number_is_fatal() {
        let r = resolver(&[
            (SUBJECT_ID_VAR, "test"),
            ("RUNNER_NATS_PENDING_SIZE", "lots"),
        ]);
        let err = r.resolve(&RunnerSettings::default()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: "RUNNER_NATS_PENDING_SIZE".into(),
                value: "lots".into()
            }
        );
    }
}
