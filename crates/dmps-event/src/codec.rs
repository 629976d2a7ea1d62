//! Tilde-delimited frame codec.
//!
//! A frame looks like
//! `~EVENT~ITB-110-CP1~3~2024-05-01T10:00:00-06:00~Status~Detail~MIC1~Battery Charge Hours Minutes~2:30~`.
//! After trimming whitespace and the outer `~`, it splits into exactly
//! [`FRAME_FIELD_COUNT`] fields:
//!
//! | index | field |
//! |---|---|
//! | 0 | `EVENT` marker |
//! | 1 | hostname |
//! | 2 | program slot (ignored) |
//! | 3 | RFC 3339 timestamp |
//! | 4, 5 | tags |
//! | 6 | device suffix |
//! | 7 | key |
//! | 8 | value |

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::event::{DecodedEvent, DeviceInfo, RoomInfo, zero_timestamp};

/// Marker that starts every event frame.
pub const EVENT_MARKER: &str = "~EVENT~";

/// Number of fields in a well-formed frame.
pub const FRAME_FIELD_COUNT: usize = 9;

const DELIMITER: char = '~';

/// Find the start of an event frame within a console line.
///
/// Returns `None` for non-event output such as prompts or command echoes.
pub fn locate_frame(line: &str) -> Option<&str> {
    if line.starts_with(EVENT_MARKER) {
        return Some(line);
    }
    line.find(EVENT_MARKER).map(|idx| &line[idx..])
}

/// Decode a single frame into an event.
///
/// The timestamp is best-effort: an unparseable value yields
/// [`zero_timestamp`] instead of an error.
pub fn decode_frame(frame: &str) -> Result<DecodedEvent> {
    let trimmed = frame.trim().trim_matches(DELIMITER);
    let fields: Vec<&str> = trimmed.split(DELIMITER).map(str::trim).collect();

    if fields.len() != FRAME_FIELD_COUNT {
        return Err(FrameError::FieldCount {
            expected: FRAME_FIELD_COUNT,
            found: fields.len(),
        });
    }

    let hostname = fields[1];
    let room = RoomInfo::from_hostname(hostname)?;

    let timestamp = match DateTime::parse_from_rfc3339(fields[3]) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            debug!(timestamp = fields[3], error = %e, "Unparseable frame timestamp");
            zero_timestamp()
        }
    };

    let key = tag_token(fields[7]);

    Ok(DecodedEvent {
        generating_system: hostname.to_string(),
        timestamp,
        tags: vec![tag_token(fields[4]), tag_token(fields[5]), key.clone()],
        target_device: DeviceInfo {
            device_id: format!("{}-{}", room.room_id, fields[6]),
            room: room.clone(),
        },
        affected_room: room,
        key,
        value: fields[8].to_string(),
        user: String::new(),
        raw_data: trimmed.to_string(),
    })
}

/// Serialize an event back into frame form.
///
/// Tags and key are written in their normalized form, so a decoded frame
/// re-encodes to an equivalent frame rather than the original bytes.
pub fn encode_frame(event: &DecodedEvent) -> String {
    let tag = |i: usize| event.tags.get(i).map(String::as_str).unwrap_or_default();

    let suffix = event
        .target_device
        .device_id
        .strip_prefix(event.target_device.room.room_id.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(&event.target_device.device_id);

    format!(
        "{EVENT_MARKER}{host}~~{ts}~{a}~{b}~{suffix}~{key}~{value}~",
        host = event.generating_system,
        ts = event.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        a = tag(0),
        b = tag(1),
        key = event.key,
        value = event.value,
    )
}

/// Lower-case and hyphenate a free-text field.
fn tag_token(field: &str) -> String {
    field.to_lowercase().replace(' ', "-")
}
