//! Framework health reporting types.

use serde::{Deserialize, Serialize};

/// Health classification from a probe call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one health probe for one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: HealthStatus,
    /// Whether the probe call itself passed.
    pub test_passed: bool,
    /// Error text when the probe failed or the adapter never loaded.
    pub error: Option<String>,
}

impl HealthInfo {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            test_passed: true,
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            test_passed: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_info_constructors() {
        let ok = HealthInfo::healthy();
        assert_eq!(ok.status, HealthStatus::Healthy);
        assert!(ok.test_passed);
        assert!(ok.error.is_none());

        let bad = HealthInfo::unhealthy("connection refused");
        assert_eq!(bad.status, HealthStatus::Unhealthy);
        assert!(!bad.test_passed);
        assert_eq!(bad.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }
}
