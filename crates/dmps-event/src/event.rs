//! Decoded event types.
//!
//! The JSON shape matches what the downstream event processor accepts:
//! kebab-case top-level keys and camel-case room identifiers, with empty
//! identifiers omitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Key used for heartbeats synthesized from polled devices.
pub const HEARTBEAT_KEY: &str = "other-crestron-health-check";

/// Value used for heartbeats synthesized from polled devices.
pub const HEARTBEAT_VALUE: &str = "response received";

/// Tags attached to every synthesized heartbeat.
pub const HEARTBEAT_TAGS: [&str; 4] = ["health", "auto-generated", "heartbeat", "core-state"];

// 0001-01-01T00:00:00Z
const ZERO_UNIX_SECS: i64 = -62_135_596_800;

/// Timestamp used when a frame carries an unparseable time.
pub fn zero_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_UNIX_SECS, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Building and room identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(rename = "buildingID", default, skip_serializing_if = "String::is_empty")]
    pub building_id: String,
    #[serde(rename = "roomID", default, skip_serializing_if = "String::is_empty")]
    pub room_id: String,
}

impl RoomInfo {
    /// Derive room identifiers from a hostname such as `ITB-110-DMPS`.
    ///
    /// Part 0 is the building, parts 0 and 1 joined by `-` form the room.
    pub fn from_hostname(hostname: &str) -> Result<Self> {
        let mut parts = hostname.split('-').map(str::trim);

        match (parts.next(), parts.next()) {
            (Some(building), Some(room)) if !building.is_empty() => Ok(Self {
                building_id: building.to_string(),
                room_id: format!("{building}-{room}"),
            }),
            _ => Err(FrameError::Hostname(hostname.to_string())),
        }
    }
}

/// Target device identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(flatten)]
    pub room: RoomInfo,
    #[serde(rename = "deviceID", default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,
}

/// A single event decoded from a device frame or synthesized by a poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Hostname of the control processor that produced the event
    #[serde(rename = "generating-system")]
    pub generating_system: String,
    pub timestamp: DateTime<Utc>,
    /// Ordered, duplicate-free tags
    #[serde(rename = "event-tags", default)]
    pub tags: Vec<String>,
    #[serde(rename = "target-device")]
    pub target_device: DeviceInfo,
    #[serde(rename = "affected-room")]
    pub affected_room: RoomInfo,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub user: String,
    /// The line the event was decoded from
    #[serde(rename = "data", default, skip_serializing_if = "String::is_empty")]
    pub raw_data: String,
}

impl DecodedEvent {
    /// Build the heartbeat event for a polled device that answered a query.
    pub fn heartbeat(
        hostname: &str,
        reply: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let room = RoomInfo::from_hostname(hostname)?;

        Ok(Self {
            generating_system: hostname.to_string(),
            timestamp,
            tags: HEARTBEAT_TAGS.iter().map(|t| t.to_string()).collect(),
            target_device: DeviceInfo {
                room: room.clone(),
                device_id: hostname.to_string(),
            },
            affected_room: room,
            key: HEARTBEAT_KEY.to_string(),
            value: HEARTBEAT_VALUE.to_string(),
            user: String::new(),
            raw_data: reply.into(),
        })
    }

    /// Append a tag unless it is already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Check whether the event carries a tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Copy the identity fields of this event under a different key and value.
    pub fn derive(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..self.clone()
        }
    }
}
