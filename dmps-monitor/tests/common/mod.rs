//! Shared fixtures: fake devices, a recording sink and a scripted roster.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use dmps_event::DecodedEvent;
use dmps_monitor::config::HandlerTimeouts;
use dmps_monitor::roster::{DeviceDescriptor, RosterError, RosterSource};
use dmps_monitor::sink::EventSink;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Short deadlines so failure paths run quickly.
pub fn fast_timeouts() -> HandlerTimeouts {
    HandlerTimeouts {
        connect: Duration::from_secs(1),
        handshake: Duration::from_secs(1),
        event_read: Duration::from_secs(2),
        query_read: Duration::from_secs(1),
        poll_interval: Duration::from_millis(100),
        reconnect_backoff: Duration::from_millis(100),
    }
}

/// Sink that hands every event to a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<DecodedEvent>,
}

pub fn recording_sink() -> (Arc<RecordingSink>, mpsc::UnboundedReceiver<DecodedEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingSink { tx }), rx)
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn forward(&self, event: &DecodedEvent) {
        let _ = self.tx.send(event.clone());
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<DecodedEvent>) -> DecodedEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("sink channel closed")
}

/// Local listener standing in for a device console.
pub async fn device_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake device");
    let port = listener.local_addr().unwrap().port().to_string();
    (listener, port)
}

/// A port with nothing listening on it.
pub async fn closed_port() -> String {
    let (listener, port) = device_listener().await;
    drop(listener);
    port
}

/// Server side of one device session.
pub struct FakeDevice {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeDevice {
    /// Accept a connection and answer the wake-up newline with a prompt.
    pub async fn accept(listener: &TcpListener) -> Self {
        let (socket, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("timed out waiting for connection")
            .expect("accept failed");
        let (reader, writer) = socket.into_split();
        let mut device = Self {
            reader: BufReader::new(reader),
            writer,
        };

        assert_eq!(device.read_line().await, "\r\n");
        device.send_raw("\r\nDMPS3-300-C>").await;
        device
    }

    pub async fn send_raw(&mut self, data: &str) {
        self.writer
            .write_all(data.as_bytes())
            .await
            .expect("write to handler failed");
    }

    pub async fn send_line(&mut self, line: &str) {
        self.send_raw(&format!("{line}\r\n")).await;
    }

    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for handler")
            .expect("read from handler failed");
        line
    }
}

/// Roster source that replays a script, then repeats its last roster.
pub struct ScriptedRoster {
    script: Mutex<VecDeque<Result<Vec<DeviceDescriptor>, String>>>,
    last: Mutex<Vec<DeviceDescriptor>>,
    fetches: AtomicUsize,
}

impl ScriptedRoster {
    pub fn new(script: Vec<Result<Vec<DeviceDescriptor>, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` fetches have happened.
    pub async fn wait_for_fetches(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.fetches() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for roster fetches");
    }
}

#[async_trait]
impl RosterSource for ScriptedRoster {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch(&self) -> Result<Vec<DeviceDescriptor>, RosterError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(roster)) => {
                *self.last.lock() = roster.clone();
                Ok(roster)
            }
            Some(Err(msg)) => Err(RosterError::Invalid(msg)),
            None => Ok(self.last.lock().clone()),
        }
    }
}
