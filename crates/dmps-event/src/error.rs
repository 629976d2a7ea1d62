//! Frame decoding error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors that can occur while decoding an event frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame did not split into the protocol's fixed number of fields.
    #[error("malformed frame: expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// The hostname cannot be split into building and room parts.
    #[error("hostname {0:?} has no building-room prefix")]
    Hostname(String),
}
