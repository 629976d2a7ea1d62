//! Event protocol support for Crestron DMPS control processors.
//!
//! DMPS units push tilde-delimited event lines over their telnet console.
//! This crate turns those lines into structured events and back.
//!
//! ## Core Types
//!
//! - [`DecodedEvent`] - A normalized device event, serialized as the JSON
//!   document accepted by the downstream event processor
//! - [`RoomInfo`] / [`DeviceInfo`] - Building/room/device identifiers derived
//!   from a device hostname
//!
//! ## Codec
//!
//! - [`locate_frame`] - Find the `~EVENT~` marker in a raw console line
//! - [`decode_frame`] - Parse one frame into a [`DecodedEvent`]
//! - [`encode_frame`] - Re-serialize an event into frame form
//!
//! ## Normalization
//!
//! - [`normalize`] - Apply the device-specific correction rules, producing
//!   the primary event plus any derived side events

pub mod codec;
pub mod error;
pub mod event;
pub mod normalize;

pub use codec::{EVENT_MARKER, FRAME_FIELD_COUNT, decode_frame, encode_frame, locate_frame};
pub use error::{FrameError, Result};
pub use event::{DecodedEvent, DeviceInfo, RoomInfo, zero_timestamp};
pub use normalize::{Normalized, normalize};
