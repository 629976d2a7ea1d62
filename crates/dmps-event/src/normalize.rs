//! Device-specific event corrections.
//!
//! Rules run in a fixed order and are independent of each other. The
//! function is pure: derived events are returned to the caller, which is
//! responsible for forwarding them before the primary event.

use tracing::{debug, warn};

use crate::event::DecodedEvent;

const CORE_STATE_TAG: &str = "core-state";

/// Keys whose values belong in the static device index.
const STATIC_INDEX_KEYS: [&str; 4] = ["software-version", "hardware-version", "volume", "muted"];

const IP_ADDRESS_KEY: &str = "IP Address";
const BATTERY_CHARGE_KEY: &str = "battery-charge-hours-minutes";
const BATTERY_MINUTES_KEY: &str = "battery-charge-minutes";
const BATTERY_TYPE_KEY: &str = "battery-type";

/// Outcome of normalizing one decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Whether the primary event should be forwarded.
    pub forward: bool,
    /// Derived events to forward ahead of the primary event.
    pub side_events: Vec<DecodedEvent>,
}

/// Apply the correction rules to `event` in place.
pub fn normalize(event: &mut DecodedEvent) -> Normalized {
    let mut side_events = Vec::new();

    // Some processors report themselves as -CP.
    event.generating_system = event.generating_system.replace("-CP", "-DMPS");
    event.target_device.device_id = event.target_device.device_id.replace("-CP", "-DMPS");

    if STATIC_INDEX_KEYS.contains(&event.key.as_str()) {
        event.add_tag(CORE_STATE_TAG);
    }

    if event.key == IP_ADDRESS_KEY {
        event.key = "ip-address".to_string();
        event.add_tag(CORE_STATE_TAG);
    }

    if event.key == BATTERY_CHARGE_KEY && event.value == "Calc" {
        event.key = BATTERY_TYPE_KEY.to_string();
        event.value.clear();
    }

    if event.key == BATTERY_CHARGE_KEY && event.value == "AA" {
        event.key = BATTERY_TYPE_KEY.to_string();
        event.value = "ALKA".to_string();
    }

    if event.key == BATTERY_CHARGE_KEY && event.value.contains(':') {
        match charge_minutes(&event.value) {
            Some(minutes) => {
                debug!(
                    device = %event.target_device.device_id,
                    value = %event.value,
                    minutes,
                    "Derived battery charge minutes"
                );
                side_events.push(event.derive(BATTERY_MINUTES_KEY, minutes.to_string()));
                side_events.push(event.derive(BATTERY_TYPE_KEY, ""));
            }
            None => warn!(
                device = %event.target_device.device_id,
                value = %event.value,
                "Battery charge out of range"
            ),
        }
    }

    Normalized {
        forward: true,
        side_events,
    }
}

/// Convert an `H:MM` charge duration to minutes. Unparseable parts count as zero.
///
/// Returns `None` when the total does not fit in an `i64`.
fn charge_minutes(value: &str) -> Option<i64> {
    let mut parts = value.split(':');
    let mut next = || {
        parts
            .next()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(0)
    };
    let hours = next();
    let minutes = next();
    hours.checked_mul(60)?.checked_add(minutes)
}
