//! Fleet supervisor.
//!
//! Owns exactly one generation of connection handlers at a time. While a
//! generation runs, the supervisor polls the roster source; when the roster
//! changes it stops the whole generation, waits for every handler to exit,
//! and only then launches the next generation from the fetched roster.
//!
//! ## Core Types
//!
//! - [`FleetSupervisor`] - The supervision loop
//! - [`SupervisorEvent`] - Lifecycle notifications, broadcast to subscribers
//! - [`FleetStatus`] - Point-in-time view of the running generation

mod generation;
mod watcher;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{HandlerTimeouts, MonitorConfig};
use crate::handler::HandlerState;
use crate::roster::{DeviceDescriptor, DeviceKind, RosterSource};
use crate::sink::EventSink;

use generation::{Generation, LaunchContext};
use watcher::WatchOutcome;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Supervisor lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// Every handler of a new generation has been spawned.
    GenerationStarted { generation: u64, devices: usize },
    HandlerStarted { generation: u64, hostname: String },
    HandlerStopped { generation: u64, hostname: String },
    /// The roster differs from the running generation's.
    RosterChanged {
        generation: u64,
        removed: Vec<String>,
        added: Vec<String>,
    },
    /// Every handler of the generation has exited.
    GenerationDrained { generation: u64 },
    RosterFetchFailed { error: String },
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub roster_poll_interval: Duration,
    pub timeouts: HandlerTimeouts,
    pub verbose_devices: HashSet<String>,
}

impl From<&MonitorConfig> for SupervisorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            roster_poll_interval: config.roster_poll_interval,
            timeouts: config.timeouts.clone(),
            verbose_devices: config.verbose_devices.clone(),
        }
    }
}

/// State of one monitored device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub hostname: String,
    pub address: String,
    pub port: String,
    pub kind: DeviceKind,
    pub state: HandlerState,
}

/// Snapshot of the running generation.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    /// `None` until the first roster has been fetched
    pub generation: Option<u64>,
    pub roster_source: String,
    pub active_handlers: usize,
    pub devices: Vec<DeviceStatus>,
}

/// Keeps the running handler set in line with the roster.
pub struct FleetSupervisor {
    roster: Arc<dyn RosterSource>,
    sink: Arc<dyn EventSink>,
    settings: SupervisorSettings,
    event_tx: broadcast::Sender<SupervisorEvent>,
    current: RwLock<Option<Arc<Generation>>>,
}

impl FleetSupervisor {
    pub fn new(
        roster: Arc<dyn RosterSource>,
        sink: Arc<dyn EventSink>,
        settings: SupervisorSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            roster,
            sink,
            settings,
            event_tx,
            current: RwLock::new(None),
        }
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    pub fn status(&self) -> FleetStatus {
        let current = self.current.read().clone();
        match current {
            Some(generation) => FleetStatus {
                generation: Some(generation.number()),
                roster_source: self.roster.describe(),
                active_handlers: generation.active_handlers(),
                devices: generation.device_statuses(),
            },
            None => FleetStatus {
                generation: None,
                roster_source: self.roster.describe(),
                active_handlers: 0,
                devices: Vec::new(),
            },
        }
    }

    /// Supervise until `shutdown` is cancelled, then drain and return.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut next_roster: Option<Vec<DeviceDescriptor>> = None;
        let mut number = 0;

        loop {
            let roster = match next_roster.take() {
                Some(roster) => roster,
                None => match self.initial_roster(&shutdown).await {
                    Some(roster) => roster,
                    None => break,
                },
            };

            number += 1;
            let generation = Arc::new(self.launch(number, roster, &shutdown));
            *self.current.write() = Some(Arc::clone(&generation));

            info!(generation = number, devices = generation.roster().len(), "Launched handlers");
            let _ = self.event_tx.send(SupervisorEvent::GenerationStarted {
                generation: number,
                devices: generation.roster().len(),
            });

            let outcome = watcher::watch(
                self.roster.as_ref(),
                generation.roster(),
                self.settings.roster_poll_interval,
                &shutdown,
                &self.event_tx,
            )
            .await;

            if let WatchOutcome::Changed { diff, .. } = &outcome {
                let removed: Vec<String> = diff.removed.iter().map(|d| d.hostname.clone()).collect();
                let added: Vec<String> = diff.added.iter().map(|d| d.hostname.clone()).collect();
                info!(generation = number, ?removed, ?added, "Roster changed, restarting handlers");
                let _ = self.event_tx.send(SupervisorEvent::RosterChanged {
                    generation: number,
                    removed,
                    added,
                });
            }

            generation.stop_and_drain().await;
            info!(generation = number, "All handlers stopped");
            let _ = self.event_tx.send(SupervisorEvent::GenerationDrained { generation: number });

            match outcome {
                WatchOutcome::Changed { roster, .. } => next_roster = Some(roster),
                WatchOutcome::Shutdown => break,
            }
        }

        info!("Fleet supervisor stopped");
    }

    fn launch(
        &self,
        number: u64,
        roster: Vec<DeviceDescriptor>,
        shutdown: &CancellationToken,
    ) -> Generation {
        let ctx = LaunchContext {
            sink: &self.sink,
            timeouts: &self.settings.timeouts,
            verbose_devices: &self.settings.verbose_devices,
            events: &self.event_tx,
        };
        Generation::launch(number, roster, ctx, shutdown)
    }

    /// Fetch the first roster, retrying every poll interval until it succeeds.
    async fn initial_roster(&self, shutdown: &CancellationToken) -> Option<Vec<DeviceDescriptor>> {
        loop {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return None,
                result = self.roster.fetch() => result,
            };

            match fetched {
                Ok(roster) => return Some(roster),
                Err(e) => {
                    warn!(source = %self.roster.describe(), error = %e, "Error retrieving roster");
                    let _ = self.event_tx.send(SupervisorEvent::RosterFetchFailed {
                        error: e.to_string(),
                    });
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.settings.roster_poll_interval) => {}
            }
        }
    }
}
