//! Error types for the app health monitor.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Errors returned synchronously by [`crate::AppHealth::start`].
///
/// Probe failures never surface here; they are folded into an unhealthy
/// status and go through the normal transition logic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("app health is closed")]
    Closed,

    #[error("app health probes already started")]
    AlreadyStarted,

    #[error("cannot start probes without a probe function")]
    MissingProbe,

    #[error("probe interval must be larger than 0")]
    ZeroInterval,

    #[error("failure threshold must be at least 1")]
    ZeroThreshold,

    #[error("probe timeout ({timeout:?}) must not exceed probe interval ({interval:?})")]
    TimeoutExceedsInterval { timeout: Duration, interval: Duration },
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },
}
