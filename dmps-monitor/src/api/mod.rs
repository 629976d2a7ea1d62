//! Status HTTP API.
//!
//! - `GET /health` - Liveness with version and uptime
//! - `GET /status` - Running generation and per-device handler state
//! - `GET /logging`, `PUT /logging` - Inspect or replace the log filter

mod routes;
mod server;

pub use routes::create_router;
pub use server::{ApiServer, ApiServerConfig, AppState};
