//! Roster change detection.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::roster::{DeviceDescriptor, RosterDiff, RosterSource};

use super::SupervisorEvent;

pub(crate) enum WatchOutcome {
    /// The roster differs; `roster` seeds the next generation.
    Changed {
        roster: Vec<DeviceDescriptor>,
        diff: RosterDiff,
    },
    Shutdown,
}

/// Poll `source` until it reports a roster that differs from `current`.
///
/// Fetch failures are logged and retried on the next tick.
pub(crate) async fn watch(
    source: &dyn RosterSource,
    current: &[DeviceDescriptor],
    interval: Duration,
    shutdown: &CancellationToken,
    events: &broadcast::Sender<SupervisorEvent>,
) -> WatchOutcome {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return WatchOutcome::Shutdown,
            _ = tokio::time::sleep(interval) => {}
        }

        debug!(source = %source.describe(), "Checking roster for changes");

        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return WatchOutcome::Shutdown,
            result = source.fetch() => result,
        };

        match fetched {
            Ok(roster) => {
                let diff = RosterDiff::compute(current, &roster);
                if diff.is_empty() {
                    debug!(devices = roster.len(), "Roster unchanged");
                } else {
                    return WatchOutcome::Changed { roster, diff };
                }
            }
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "Error retrieving roster");
                let _ = events.send(SupervisorEvent::RosterFetchFailed {
                    error: e.to_string(),
                });
            }
        }
    }
}
