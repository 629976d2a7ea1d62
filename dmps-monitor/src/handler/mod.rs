//! Per-device connection handler.
//!
//! One handler owns one device connection for the lifetime of a supervision
//! generation. It runs as a single task looping through
//! `Connecting -> Handshaking -> Ready`, and falls back to `Connecting` on
//! any read or write failure until its cancellation token fires.
//!
//! Event-driven devices are served by [`events`], polled devices by [`poll`].

mod events;
mod poll;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dmps_event::DecodedEvent;

use crate::config::HandlerTimeouts;
use crate::roster::{DeviceDescriptor, DeviceKind};
use crate::sink::EventSink;
use crate::transport::TelnetConnection;

/// Lifecycle state of a connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerState {
    Connecting,
    Handshaking,
    Ready,
    ReadFailed,
    Stopped,
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::ReadFailed => "read_failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How a connected session ended.
#[derive(Debug, PartialEq)]
pub(crate) enum SessionEnd {
    /// Cancellation was requested.
    Stopped,
    /// The connection failed; open a new one.
    Reconnect,
}

/// Result of one connect attempt.
enum Establish {
    Connected(TelnetConnection),
    Failed,
    Cancelled,
}

/// Long-lived connection to one device.
pub struct ConnectionHandler {
    device: DeviceDescriptor,
    sink: Arc<dyn EventSink>,
    timeouts: HandlerTimeouts,
    verbose: bool,
    cancel: CancellationToken,
    state_tx: watch::Sender<HandlerState>,
}

impl ConnectionHandler {
    pub fn new(
        device: DeviceDescriptor,
        sink: Arc<dyn EventSink>,
        timeouts: HandlerTimeouts,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(HandlerState::Connecting);
        Self {
            device,
            sink,
            timeouts,
            verbose: false,
            cancel,
            state_tx,
        }
    }

    /// Raise per-line logging for this device from DEBUG to INFO.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<HandlerState> {
        self.state_tx.subscribe()
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let hostname = self.device.hostname.as_str();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut conn = match self.establish().await {
                Establish::Connected(conn) => conn,
                Establish::Cancelled => break,
                Establish::Failed => {
                    let backoff = tokio::time::sleep(self.timeouts.reconnect_backoff);
                    if self.until_cancelled(backoff).await.is_none() {
                        break;
                    }
                    continue;
                }
            };

            self.set_state(HandlerState::Ready);
            info!(device = %hostname, peer = %conn.peer(), kind = %self.device.kind, "Connected");

            let end = match self.device.kind {
                DeviceKind::Dmps => events::run_session(&self, &mut conn).await,
                DeviceKind::Polled => poll::run_session(&self, &mut conn).await,
            };
            conn.close().await;

            match end {
                SessionEnd::Stopped => break,
                SessionEnd::Reconnect => {
                    self.set_state(HandlerState::ReadFailed);
                    warn!(device = %hostname, "Restarting connection");
                }
            }
        }

        self.set_state(HandlerState::Stopped);
        debug!(device = %hostname, "Handler stopped");
    }

    async fn establish(&self) -> Establish {
        let device = &self.device;
        self.set_state(HandlerState::Connecting);
        self.log_line("Connecting", &format!("{}:{}", device.address, device.port));

        let connect = TelnetConnection::connect(&device.address, &device.port, self.timeouts.connect);
        let mut conn = match self.until_cancelled(connect).await {
            None => return Establish::Cancelled,
            Some(Ok(conn)) => conn,
            Some(Err(e)) => {
                warn!(device = %device.hostname, error = %e, "Error creating connection");
                return Establish::Failed;
            }
        };

        self.set_state(HandlerState::Handshaking);
        match self.until_cancelled(conn.handshake(self.timeouts.handshake)).await {
            None => Establish::Cancelled,
            Some(Ok(_)) => Establish::Connected(conn),
            Some(Err(e)) => {
                warn!(device = %device.hostname, error = %e, "Error creating connection");
                Establish::Failed
            }
        }
    }

    /// Race a suspension point against cancellation.
    pub(crate) async fn until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    pub(crate) async fn forward(&self, event: &DecodedEvent) {
        self.sink.forward(event).await;
    }

    /// Per-line logging, INFO for verbose devices and DEBUG otherwise.
    pub(crate) fn log_line(&self, message: &str, line: &str) {
        let line = line.trim();
        if self.verbose {
            info!(device = %self.device.hostname, line = %line, "{message}");
        } else {
            debug!(device = %self.device.hostname, line = %line, "{message}");
        }
    }

    fn set_state(&self, state: HandlerState) {
        self.state_tx.send_replace(state);
    }
}
