//! Logging setup with a reloadable filter.
//!
//! This module provides:
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Local timezone timestamps for logs

use std::sync::Arc;

use chrono::Local;
use tracing::info;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "dmps_monitor=info,dmps_event=info";

/// Timer that formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle for inspecting and replacing the active filter.
pub struct LoggingConfig {
    handle: FilterHandle,
}

impl LoggingConfig {
    fn new(handle: FilterHandle) -> Self {
        Self { handle }
    }

    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive.
    ///
    /// # Returns
    /// Error if the directive is invalid.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::other(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

/// Initialize console logging with a reloadable filter.
///
/// `RUST_LOG` takes precedence over [`DEFAULT_LOG_FILTER`].
pub fn init_logging() -> crate::Result<Arc<LoggingConfig>> {
    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .try_init()
        .map_err(|e| {
            crate::Error::other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(Arc::new(LoggingConfig::new(filter_handle)))
}

/// Available logging modules for API responses.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("dmps_monitor", "Supervisor, handlers and sink"),
        ("dmps_event", "Frame codec and normalizer"),
        ("reqwest", "HTTP requests"),
        ("tower_http", "HTTP middleware"),
    ]
}

#[cfg(test)]
pub(crate) fn detached() -> (Arc<LoggingConfig>, reload::Layer<EnvFilter, tracing_subscriber::Registry>) {
    let (layer, handle) = reload::Layer::new(EnvFilter::new(DEFAULT_LOG_FILTER));
    (Arc::new(LoggingConfig::new(handle)), layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("dmps_monitor=info"));
        assert!(DEFAULT_LOG_FILTER.contains("dmps_event=info"));
    }

    #[test]
    fn test_set_filter() {
        let (config, _layer) = detached();

        config.set_filter("dmps_monitor=debug").unwrap();
        assert_eq!(config.get_filter(), "dmps_monitor=debug");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let (config, _layer) = detached();

        assert!(config.set_filter("dmps_monitor=loud").is_err());
        assert!(config.get_filter().contains("dmps_event=info"));
    }

    #[test]
    fn test_available_modules() {
        let modules = available_modules();
        assert!(modules.iter().any(|(name, _)| *name == "dmps_monitor"));
    }
}
