//! Session loop for devices that only answer queries.
//!
//! Each round drains stale output, sends the query, waits for a substantive
//! reply and turns it into a heartbeat event.

use chrono::Utc;
use tracing::warn;

use dmps_event::DecodedEvent;

use super::{ConnectionHandler, SessionEnd};
use crate::transport::{TelnetConnection, TransportError};

pub(super) async fn run_session(
    handler: &ConnectionHandler,
    conn: &mut TelnetConnection,
) -> SessionEnd {
    let hostname = handler.device.hostname.as_str();
    let command = handler.device.query();

    loop {
        let stale = conn.discard_buffered();
        if !stale.is_empty() {
            handler.log_line("Cleared buffered output", &String::from_utf8_lossy(&stale));
        }

        handler.log_line("Writing query", command);
        match handler
            .until_cancelled(conn.write_command(command, handler.timeouts.query_read))
            .await
        {
            None => return SessionEnd::Stopped,
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(device = %hostname, error = %e, "Error writing query");
                return SessionEnd::Reconnect;
            }
        }

        let reply = match handler.until_cancelled(read_reply(handler, conn, command)).await {
            None => return SessionEnd::Stopped,
            Some(Ok(reply)) => reply,
            Some(Err(e)) => {
                warn!(device = %hostname, error = %e, "Error reading reply");
                return SessionEnd::Reconnect;
            }
        };
        handler.log_line("Reply received", &reply);

        match DecodedEvent::heartbeat(hostname, reply, Utc::now()) {
            Ok(event) => handler.forward(&event).await,
            Err(e) => warn!(device = %hostname, error = %e, "Cannot build heartbeat"),
        }

        let wait = tokio::time::sleep(handler.timeouts.poll_interval);
        if handler.until_cancelled(wait).await.is_none() {
            return SessionEnd::Stopped;
        }
    }
}

/// Read until a line that is neither blank nor the echoed command.
async fn read_reply(
    handler: &ConnectionHandler,
    conn: &mut TelnetConnection,
    command: &str,
) -> Result<String, TransportError> {
    loop {
        let line = conn.read_line(handler.timeouts.query_read).await?;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed == command {
            continue;
        }
        return Ok(trimmed.to_string());
    }
}
