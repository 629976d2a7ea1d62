//! Downstream event delivery.
//!
//! Delivery is best-effort: [`EventSink::forward`] never fails. Each
//! implementation logs its own failures.

mod http;

pub use http::{HttpEventSink, SinkError};

use async_trait::async_trait;
use dmps_event::DecodedEvent;

/// Destination for decoded events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    async fn forward(&self, event: &DecodedEvent);
}
