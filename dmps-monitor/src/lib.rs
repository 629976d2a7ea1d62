//! Connection supervisor for a fleet of Crestron DMPS control processors.
//!
//! Keeps one telnet session open per device listed in the deployment roster,
//! turns the device output into events and posts them to the event processor.
//! When the roster changes, the whole set of sessions is drained and relaunched.

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod roster;
pub mod sink;
pub mod supervisor;
pub mod transport;

pub use error::{Error, Result};
