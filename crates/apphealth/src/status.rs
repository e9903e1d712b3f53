//! Health status value.

use serde::{Deserialize, Serialize};

/// Result of a probe or a passive report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub is_healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Status {
    /// Status with an explicit flag and optional reason.
    pub fn new(is_healthy: bool, reason: Option<String>) -> Self {
        Self { is_healthy, reason }
    }

    /// Healthy, no reason attached.
    pub fn healthy() -> Self {
        Self::new(true, None)
    }

    /// Unhealthy with a human-readable reason.
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::new(false, Some(reason.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert!(Status::healthy().is_healthy);
        assert_eq!(Status::healthy().reason, None);

        let down = Status::unhealthy("connection refused");
        assert!(!down.is_healthy);
        assert_eq!(down.reason.as_deref(), Some("connection refused"));
    }

    #[test]
    fn reason_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&Status::healthy()).unwrap();
        assert_eq!(json, r#"{"is_healthy":true}"#);

        let parsed: Status = serde_json::from_str(r#"{"is_healthy":false,"reason":"oom"}"#).unwrap();
        assert_eq!(parsed, Status::unhealthy("oom"));
    }
}
