//! Monitor configuration and its TOML file form.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, HealthError, HealthResult};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_THRESHOLD: u32 = 3;

/// Configuration for a single [`crate::AppHealth`] monitor.
///
/// Immutable for the monitor's lifetime. Ranges are checked by
/// [`AppHealthConfig::validate`] when probing starts, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppHealthConfig {
    /// Time between scheduled probes.
    pub probe_interval: Duration,
    /// Upper bound on a single probe. Must not exceed `probe_interval`.
    pub probe_timeout: Duration,
    /// Consecutive unhealthy results before the app is reported unhealthy.
    pub threshold: u32,
    /// Ignore passive reports and rely on probes alone.
    pub probe_only: bool,
}

impl Default for AppHealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            threshold: DEFAULT_THRESHOLD,
            probe_only: false,
        }
    }
}

/// On-disk form. Every key is optional; durations are strings like `"5s"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppHealthFile {
    pub probe_interval: Option<String>,
    pub probe_timeout: Option<String>,
    pub threshold: Option<u32>,
    pub probe_only: Option<bool>,
}

impl AppHealthConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: AppHealthFile = toml::from_str(s)?;
        file.into_config()
    }

    /// Check the ranges required to start probing.
    pub fn validate(&self) -> HealthResult<()> {
        if self.probe_interval.is_zero() {
            return Err(HealthError::ZeroInterval);
        }
        if self.probe_timeout > self.probe_interval {
            return Err(HealthError::TimeoutExceedsInterval {
                timeout: self.probe_timeout,
                interval: self.probe_interval,
            });
        }
        if self.threshold == 0 {
            return Err(HealthError::ZeroThreshold);
        }
        Ok(())
    }
}

impl AppHealthFile {
    /// Fill missing keys with defaults.
    pub fn into_config(self) -> Result<AppHealthConfig, ConfigError> {
        let defaults = AppHealthConfig::default();
        Ok(AppHealthConfig {
            probe_interval: duration_field("probe_interval", self.probe_interval)?
                .unwrap_or(defaults.probe_interval),
            probe_timeout: duration_field("probe_timeout", self.probe_timeout)?
                .unwrap_or(defaults.probe_timeout),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            probe_only: self.probe_only.unwrap_or(defaults.probe_only),
        })
    }
}

fn duration_field(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) => parse_duration(&v)
            .map(Some)
            .ok_or(ConfigError::InvalidDuration { field, value: v }),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
