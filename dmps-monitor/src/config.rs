//! Process configuration.
//!
//! Everything is read from environment variables once at startup. Missing
//! required values are fatal; optional values fall back to defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiServerConfig;
use crate::error::{Error, Result};

/// Default interval between roster checks.
pub const DEFAULT_ROSTER_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Timeout applied to each sink POST.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadlines and intervals used by connection handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerTimeouts {
    /// TCP dial timeout
    pub connect: Duration,
    /// Time allowed for the device to print its prompt
    pub handshake: Duration,
    /// Read deadline while waiting for pushed events
    pub event_read: Duration,
    /// Read deadline for a query reply
    pub query_read: Duration,
    /// Wait between heartbeat queries
    pub poll_interval: Duration,
    /// Wait after a failed connect before retrying
    pub reconnect_backoff: Duration,
}

impl Default for HandlerTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            handshake: Duration::from_secs(30),
            event_read: Duration::from_secs(90),
            query_read: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            reconnect_backoff: Duration::from_secs(5),
        }
    }
}

/// Where the device roster comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterLocation {
    /// CouchDB deployment database with basic-auth credentials.
    Couch {
        address: String,
        username: String,
        password: String,
    },
    /// Local JSON file in the same document shape.
    File(PathBuf),
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Event processor URLs; every event is posted to each one
    pub sink_urls: Vec<String>,
    pub sink_timeout: Duration,
    pub roster: RosterLocation,
    pub roster_poll_interval: Duration,
    /// Hostnames whose per-line logs are raised to INFO
    pub verbose_devices: HashSet<String>,
    pub timeouts: HandlerTimeouts,
    pub api: ApiServerConfig,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Supported keys:
    /// - `EVENT_PROCESSOR_HOST` (required, comma-separated)
    /// - `ROSTER_FILE`, or `DB_ADDRESS` / `DB_USERNAME` / `DB_PASSWORD`
    /// - `ROSTER_POLL_INTERVAL_SECS`, `RECONNECT_BACKOFF_SECS`
    /// - `VERBOSE_DEVICES` (comma-separated hostnames)
    /// - `API_BIND_ADDRESS`, `API_PORT`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| Error::config(format!("{key} is not set")));

        let sink_urls = split_list(&require("EVENT_PROCESSOR_HOST")?);
        if sink_urls.is_empty() {
            return Err(Error::config("EVENT_PROCESSOR_HOST has no addresses"));
        }

        let roster = match get("ROSTER_FILE") {
            Some(path) => RosterLocation::File(PathBuf::from(path)),
            None => RosterLocation::Couch {
                address: require("DB_ADDRESS")?,
                username: require("DB_USERNAME")?,
                password: require("DB_PASSWORD")?,
            },
        };

        let roster_poll_interval = match get("ROSTER_POLL_INTERVAL_SECS") {
            Some(raw) => parse_secs("ROSTER_POLL_INTERVAL_SECS", &raw)?,
            None => DEFAULT_ROSTER_POLL_INTERVAL,
        };

        let mut timeouts = HandlerTimeouts::default();
        if let Some(raw) = get("RECONNECT_BACKOFF_SECS") {
            timeouts.reconnect_backoff = parse_secs("RECONNECT_BACKOFF_SECS", &raw)?;
        }

        let verbose_devices = get("VERBOSE_DEVICES")
            .map(|raw| split_list(&raw).into_iter().collect())
            .unwrap_or_default();

        let mut api = ApiServerConfig::default();
        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            api.bind_address = bind_address;
        }
        if let Some(port) = get("API_PORT") {
            api.port = port
                .parse()
                .map_err(|e| Error::config(format!("API_PORT {port:?}: {e}")))?;
        }

        Ok(Self {
            sink_urls,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            roster,
            roster_poll_interval,
            verbose_devices,
            timeouts,
            api,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    match raw.parse::<u64>() {
        Ok(0) => Err(Error::config(format!("{key} must be greater than zero"))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(Error::config(format!("{key} {raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const COUCH: &[(&str, &str)] = &[
        ("EVENT_PROCESSOR_HOST", "http://a:7000/event, http://b:7000/event"),
        ("DB_ADDRESS", "https://couch.example:5984"),
        ("DB_USERNAME", "monitor"),
        ("DB_PASSWORD", "secret"),
    ];

    #[test]
    fn test_couch_config_with_defaults() {
        let config = MonitorConfig::from_lookup(lookup(COUCH)).unwrap();

        assert_eq!(config.sink_urls, ["http://a:7000/event", "http://b:7000/event"]);
        assert_eq!(config.sink_timeout, Duration::from_secs(5));
        assert_eq!(
            config.roster,
            RosterLocation::Couch {
                address: "https://couch.example:5984".to_string(),
                username: "monitor".to_string(),
                password: "secret".to_string(),
            }
        );
        assert_eq!(config.roster_poll_interval, Duration::from_secs(15));
        assert_eq!(config.timeouts, HandlerTimeouts::default());
        assert!(config.verbose_devices.is_empty());
        assert_eq!(config.api.bind_address, "0.0.0.0");
        assert_eq!(config.api.port, 10015);
    }

    #[test]
    fn test_missing_sink_is_fatal() {
        let err = MonitorConfig::from_lookup(lookup(&COUCH[1..])).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("EVENT_PROCESSOR_HOST")));
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let err = MonitorConfig::from_lookup(lookup(&COUCH[..3])).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("DB_PASSWORD")));
    }

    #[test]
    fn test_roster_file_replaces_couch() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("EVENT_PROCESSOR_HOST", "http://a/event"),
            ("ROSTER_FILE", "/etc/dmps/roster.json"),
        ]))
        .unwrap();

        assert_eq!(config.roster, RosterLocation::File("/etc/dmps/roster.json".into()));
    }

    #[test]
    fn test_optional_overrides() {
        let mut pairs = COUCH.to_vec();
        pairs.extend([
            ("ROSTER_POLL_INTERVAL_SECS", "300"),
            ("RECONNECT_BACKOFF_SECS", "2"),
            ("VERBOSE_DEVICES", "ITB-110-DMPS,,JFSB-B192-CP1 "),
            ("API_BIND_ADDRESS", "127.0.0.1"),
            ("API_PORT", "8080"),
        ]);
        let config = MonitorConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.roster_poll_interval, Duration::from_secs(300));
        assert_eq!(config.timeouts.reconnect_backoff, Duration::from_secs(2));
        assert_eq!(config.verbose_devices.len(), 2);
        assert!(config.verbose_devices.contains("JFSB-B192-CP1"));
        assert_eq!(config.api.bind_address, "127.0.0.1");
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        for (key, value) in [
            ("ROSTER_POLL_INTERVAL_SECS", "soon"),
            ("ROSTER_POLL_INTERVAL_SECS", "0"),
            ("API_PORT", "70000"),
        ] {
            let mut pairs = COUCH.to_vec();
            pairs.push((key, value));
            let err = MonitorConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, Error::Configuration(msg) if msg.contains(key)));
        }
    }
}
