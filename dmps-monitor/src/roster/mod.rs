//! Device roster: descriptors, sources and change detection.
//!
//! ## Core Types
//!
//! - [`DeviceDescriptor`] - One device to monitor
//! - [`RosterSource`] - Where the desired roster is fetched from
//! - [`RosterDiff`] - Order-insensitive difference between two rosters

mod couch;
mod file;

pub use couch::CouchRosterSource;
pub use file::FileRosterSource;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Console port used when the roster leaves it unset.
pub const DEFAULT_PORT: &str = "23";

/// Command sent to polled devices without an explicit query.
pub const DEFAULT_QUERY_COMMAND: &str = "VERSION";

/// Roster fetch failures.
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("roster source responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse roster: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read roster: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid roster entry: {0}")]
    Invalid(String),
}

/// How a device delivers its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Pushes `~EVENT~` frames on its own.
    Dmps,
    /// Only answers queries; monitored with heartbeats.
    Polled,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dmps => write!(f, "dmps"),
            Self::Polled => write!(f, "polled"),
        }
    }
}

/// A device to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub hostname: String,
    pub address: String,
    pub port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_command: Option<String>,
    pub kind: DeviceKind,
}

impl DeviceDescriptor {
    /// Event-driven device on the default port.
    pub fn dmps(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            port: DEFAULT_PORT.to_string(),
            query_command: None,
            kind: DeviceKind::Dmps,
        }
    }

    /// Polled device on the default port.
    pub fn polled(
        hostname: impl Into<String>,
        address: impl Into<String>,
        query_command: Option<String>,
    ) -> Self {
        Self {
            kind: DeviceKind::Polled,
            query_command,
            ..Self::dmps(hostname, address)
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = normalize_port(port.into());
        self
    }

    /// Roster identity used for change detection.
    pub fn identity(&self) -> (&str, &str) {
        (&self.hostname, &self.address)
    }

    /// Query sent to polled devices.
    pub fn query(&self) -> &str {
        self.query_command
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_QUERY_COMMAND)
    }
}

fn normalize_port(port: String) -> String {
    let port = port.trim();
    if port.is_empty() || port == "0" {
        DEFAULT_PORT.to_string()
    } else {
        port.to_string()
    }
}

/// Roster document as stored by the deployment database.
#[derive(Debug, Deserialize)]
pub struct RosterDocument {
    #[serde(default)]
    pub list: Vec<RosterEntry>,
}

/// A single raw roster entry.
#[derive(Debug, Deserialize)]
pub struct RosterEntry {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "port_string")]
    pub port: String,
    #[serde(rename = "commandToQuery", default)]
    pub command_to_query: String,
    #[serde(default)]
    pub kind: Option<DeviceKind>,
}

impl RosterDocument {
    /// Validate entries and resolve defaults.
    pub fn into_descriptors(self) -> Result<Vec<DeviceDescriptor>, RosterError> {
        self.list
            .into_iter()
            .map(DeviceDescriptor::try_from)
            .collect()
    }
}

impl TryFrom<RosterEntry> for DeviceDescriptor {
    type Error = RosterError;

    fn try_from(entry: RosterEntry) -> Result<Self, Self::Error> {
        let hostname = entry.hostname.trim().to_string();
        let address = entry.address.trim().to_string();
        if hostname.is_empty() || address.is_empty() {
            return Err(RosterError::Invalid(format!(
                "entry needs hostname and address (hostname {hostname:?}, address {address:?})"
            )));
        }

        let command = entry.command_to_query.trim().to_string();
        let kind = entry.kind.unwrap_or(if command.is_empty() {
            DeviceKind::Dmps
        } else {
            DeviceKind::Polled
        });

        Ok(Self {
            hostname,
            address,
            port: normalize_port(entry.port),
            query_command: (!command.is_empty()).then_some(command),
            kind,
        })
    }
}

fn port_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Port>::deserialize(deserializer)? {
        Some(Port::Text(s)) => s,
        Some(Port::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

/// Source of the desired device roster.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;

    /// Fetch the current roster.
    async fn fetch(&self) -> Result<Vec<DeviceDescriptor>, RosterError>;
}

/// Devices that differ between two rosters.
///
/// Entries are matched by [`DeviceDescriptor::identity`] one-for-one, so
/// order is ignored but duplicate counts are not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RosterDiff {
    /// In the old roster without a match in the new one
    pub removed: Vec<DeviceDescriptor>,
    /// In the new roster without a match in the old one
    pub added: Vec<DeviceDescriptor>,
}

impl RosterDiff {
    pub fn compute(old: &[DeviceDescriptor], new: &[DeviceDescriptor]) -> Self {
        let mut unmatched: Vec<&DeviceDescriptor> = new.iter().collect();
        let mut removed = Vec::new();

        for device in old {
            match unmatched
                .iter()
                .position(|candidate| candidate.identity() == device.identity())
            {
                Some(idx) => {
                    unmatched.swap_remove(idx);
                }
                None => removed.push(device.clone()),
            }
        }

        Self {
            removed,
            added: unmatched.into_iter().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<DeviceDescriptor>, RosterError> {
        serde_json::from_str::<RosterDocument>(json)?.into_descriptors()
    }

    #[test]
    fn test_entry_defaults() {
        let devices = parse(
            r#"{"list": [
                {"hostname": "ITB-110-CP1", "address": "10.1.1.10", "port": ""},
                {"hostname": "ITB-110-CP2", "address": "10.1.1.11", "port": "0"},
                {"hostname": "JFSB-B192-CP1", "address": "10.1.2.10", "port": 41795, "commandToQuery": "INFO"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(devices[0].port, "23");
        assert_eq!(devices[0].kind, DeviceKind::Dmps);
        assert_eq!(devices[0].query_command, None);
        assert_eq!(devices[1].port, "23");
        assert_eq!(devices[2].port, "41795");
        assert_eq!(devices[2].kind, DeviceKind::Polled);
        assert_eq!(devices[2].query(), "INFO");
    }

    #[test]
    fn test_explicit_kind_wins() {
        let devices = parse(
            r#"{"list": [{"hostname": "ITB-110-CP1", "address": "10.1.1.10", "kind": "polled"}]}"#,
        )
        .unwrap();

        assert_eq!(devices[0].kind, DeviceKind::Polled);
        assert_eq!(devices[0].query(), DEFAULT_QUERY_COMMAND);
    }

    #[test]
    fn test_entry_without_address_rejected() {
        let err = parse(r#"{"list": [{"hostname": "ITB-110-CP1"}]}"#).unwrap_err();
        assert!(matches!(err, RosterError::Invalid(_)));
    }

    #[test]
    fn test_missing_list_is_empty() {
        assert!(parse("{}").unwrap().is_empty());
    }

    #[test]
    fn test_diff_ignores_order() {
        let a = DeviceDescriptor::dmps("ITB-110-CP1", "10.1.1.10");
        let b = DeviceDescriptor::dmps("ITB-120-CP1", "10.1.1.20");
        let c = DeviceDescriptor::polled("ITB-130-CP1", "10.1.1.30", None);

        let diff = RosterDiff::compute(&[a.clone(), b.clone(), c.clone()], &[c, a, b]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_uses_hostname_and_address_only() {
        let a = DeviceDescriptor::dmps("ITB-110-CP1", "10.1.1.10");
        let moved_port = a.clone().with_port("41795");

        assert!(RosterDiff::compute(&[a], &[moved_port]).is_empty());
    }

    #[test]
    fn test_diff_reports_swaps() {
        let a = DeviceDescriptor::dmps("ITB-110-CP1", "10.1.1.10");
        let b = DeviceDescriptor::dmps("ITB-120-CP1", "10.1.1.20");
        let c = DeviceDescriptor::dmps("ITB-130-CP1", "10.1.1.30");

        let diff = RosterDiff::compute(&[a.clone(), b.clone()], &[b, c.clone()]);
        assert_eq!(diff.removed, [a]);
        assert_eq!(diff.added, [c]);
    }

    #[test]
    fn test_diff_counts_duplicates() {
        let a = DeviceDescriptor::dmps("ITB-110-CP1", "10.1.1.10");

        let diff = RosterDiff::compute(&[a.clone(), a.clone()], &[a.clone()]);
        assert_eq!(diff.removed, [a]);
        assert!(diff.added.is_empty());
    }

    #[test]
    fn test_readdressed_device_is_a_change() {
        let a = DeviceDescriptor::dmps("ITB-110-CP1", "10.1.1.10");
        let readdressed = DeviceDescriptor::dmps("ITB-110-CP1", "10.1.1.99");

        let diff = RosterDiff::compute(&[a], &[readdressed]);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
    }
}
