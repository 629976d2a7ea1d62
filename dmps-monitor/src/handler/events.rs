//! Session loop for devices that push `~EVENT~` frames.

use tracing::{debug, warn};

use dmps_event::{decode_frame, locate_frame, normalize};

use super::{ConnectionHandler, SessionEnd};
use crate::transport::TelnetConnection;

pub(super) async fn run_session(
    handler: &ConnectionHandler,
    conn: &mut TelnetConnection,
) -> SessionEnd {
    let hostname = handler.device.hostname.as_str();
    let deadline = handler.timeouts.event_read;

    loop {
        let line = match handler.until_cancelled(conn.read_line(deadline)).await {
            None => return SessionEnd::Stopped,
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!(device = %hostname, error = %e, "Error reading events");
                return SessionEnd::Reconnect;
            }
        };

        handle_line(handler, &line).await;
    }
}

/// Decode, normalize and forward one console line.
pub(super) async fn handle_line(handler: &ConnectionHandler, line: &str) {
    let Some(frame) = locate_frame(line) else {
        handler.log_line("Ignoring non-event output", line);
        return;
    };
    handler.log_line("Event received", frame);

    let mut event = match decode_frame(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!(device = %handler.device.hostname, error = %e, frame = %frame.trim(), "Malformed event");
            return;
        }
    };

    let normalized = normalize(&mut event);

    for side in &normalized.side_events {
        handler.forward(side).await;
    }

    if normalized.forward {
        handler.forward(&event).await;
    } else {
        debug!(device = %handler.device.hostname, key = %event.key, "Ignoring event");
    }
}
