use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime settings, read from the environment (and `.env`) at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Externally visible origin Twilio uses to reach us, e.g. `https://ivr.example.com`.
    /// Needed to rebuild the signed URL when running behind a proxy.
    pub public_base_url: Option<String>,
    /// Webhook signatures are only checked when this is set.
    pub twilio_auth_token: Option<String>,
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub session_capacity: usize,
    /// Re-prompts allowed per step before escalating.  Zero disables the bound.
    pub max_reprompts: u32,
    pub frontdesk_number: Option<String>,
    pub voice: Option<String>,
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_base_url: None,
            twilio_auth_token: None,
            session_ttl: Duration::from_secs(900),
            session_sweep_interval: Duration::from_secs(60),
            session_capacity: 10_000,
            max_reprompts: 3,
            frontdesk_number: None,
            voice: None,
            database_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values count as unset so `FOO=` in a .env file falls back to the default.
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let bind_addr = match var("BIND_ADDR") {
            Some(value) => parse(value, "BIND_ADDR", "socket address")?,
            None => defaults.bind_addr,
        };
        let session_ttl = match var("SESSION_TTL_SECS") {
            Some(value) => Duration::from_secs(parse(value, "SESSION_TTL_SECS", "number of seconds")?),
            None => defaults.session_ttl,
        };
        let session_sweep_interval = match var("SESSION_SWEEP_SECS") {
            Some(value) => {
                Duration::from_secs(parse(value, "SESSION_SWEEP_SECS", "number of seconds")?)
            }
            None => defaults.session_sweep_interval,
        };
        let session_capacity = match var("SESSION_CAPACITY") {
            Some(value) => parse(value, "SESSION_CAPACITY", "session count")?,
            None => defaults.session_capacity,
        };
        let max_reprompts = match var("IVR_MAX_REPROMPTS") {
            Some(value) => parse(value, "IVR_MAX_REPROMPTS", "retry count")?,
            None => defaults.max_reprompts,
        };

        Ok(Self {
            bind_addr,
            public_base_url: var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
            session_ttl,
            session_sweep_interval,
            session_capacity,
            max_reprompts,
            frontdesk_number: var("FRONTDESK_NUMBER"),
            voice: var("IVR_VOICE"),
            database_url: var("DATABASE_URL"),
        })
    }
}

fn parse<T: std::str::FromStr>(
    value: String,
    name: &'static str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.session_ttl, Duration::from_secs(900));
        assert_eq!(config.max_reprompts, 3);
        assert!(config.twilio_auth_token.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("PUBLIC_BASE_URL", "https://ivr.example.com/"),
            ("SESSION_TTL_SECS", "30"),
            ("IVR_MAX_REPROMPTS", "0"),
            ("FRONTDESK_NUMBER", "+15550100"),
            ("TWILIO_AUTH_TOKEN", ""),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.public_base_url.as_deref(), Some("https://ivr.example.com"));
        assert_eq!(config.session_ttl, Duration::from_secs(30));
        assert_eq!(config.max_reprompts, 0);
        assert_eq!(config.frontdesk_number.as_deref(), Some("+15550100"));
        assert!(config.twilio_auth_token.is_none());
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::from_lookup(lookup(&[("SESSION_CAPACITY", "lots")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "SESSION_CAPACITY must be a valid session count, got 'lots'"
        );
    }
}
