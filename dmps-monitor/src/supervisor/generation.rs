//! One set of running handlers for one roster snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info_span};

use crate::config::HandlerTimeouts;
use crate::handler::{ConnectionHandler, HandlerState};
use crate::roster::DeviceDescriptor;
use crate::sink::EventSink;

use super::{DeviceStatus, SupervisorEvent};

/// Everything a generation needs to start its handlers.
pub(crate) struct LaunchContext<'a> {
    pub sink: &'a Arc<dyn EventSink>,
    pub timeouts: &'a HandlerTimeouts,
    pub verbose_devices: &'a HashSet<String>,
    pub events: &'a broadcast::Sender<SupervisorEvent>,
}

struct HandlerSlot {
    device: DeviceDescriptor,
    state: watch::Receiver<HandlerState>,
}

/// Running handlers sharing one stop signal and one drain barrier.
pub(crate) struct Generation {
    number: u64,
    roster: Vec<DeviceDescriptor>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    handlers: Vec<HandlerSlot>,
}

impl Generation {
    /// Spawn one handler per roster entry.
    ///
    /// The stop signal is a child of `parent`, so process shutdown also
    /// stops the generation.
    pub fn launch(
        number: u64,
        roster: Vec<DeviceDescriptor>,
        ctx: LaunchContext<'_>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let tracker = TaskTracker::new();
        let mut handlers = Vec::with_capacity(roster.len());

        for device in &roster {
            let handler = ConnectionHandler::new(
                device.clone(),
                Arc::clone(ctx.sink),
                ctx.timeouts.clone(),
                cancel.clone(),
            )
            .verbose(ctx.verbose_devices.contains(&device.hostname));

            handlers.push(HandlerSlot {
                device: device.clone(),
                state: handler.subscribe(),
            });

            let hostname = device.hostname.clone();
            let events = ctx.events.clone();
            let span = info_span!("handler", device = %hostname, generation = number);

            let _ = events.send(SupervisorEvent::HandlerStarted {
                generation: number,
                hostname: hostname.clone(),
            });

            tracker.spawn(
                async move {
                    handler.run().await;
                    let _ = events.send(SupervisorEvent::HandlerStopped {
                        generation: number,
                        hostname,
                    });
                }
                .instrument(span),
            );
        }

        tracker.close();

        Self {
            number,
            roster,
            cancel,
            tracker,
            handlers,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn roster(&self) -> &[DeviceDescriptor] {
        &self.roster
    }

    /// Handlers that have not finished yet.
    pub fn active_handlers(&self) -> usize {
        self.tracker.len()
    }

    /// Signal every handler to stop and wait until all of them have exited.
    pub async fn stop_and_drain(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
    }

    pub fn device_statuses(&self) -> Vec<DeviceStatus> {
        self.handlers
            .iter()
            .map(|slot| DeviceStatus {
                hostname: slot.device.hostname.clone(),
                address: slot.device.address.clone(),
                port: slot.device.port.clone(),
                kind: slot.device.kind,
                state: *slot.state.borrow(),
            })
            .collect()
    }
}
