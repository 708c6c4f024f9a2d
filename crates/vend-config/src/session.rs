//! Session / credential-refresh configuration.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default renewal lead time before expiry, in seconds.
const fn default_refresh_threshold_secs() -> u64 {
    60
}

/// Default renewal request timeout in seconds.
const fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Renewal endpoint URL (e.g., `https://api.vend.example/v1/session/renew`).
    #[serde(default)]
    pub renewal_url: String,

    /// How long before expiry a credential is treated as due for renewal,
    /// in seconds. A credential with less than this much lifetime left is
    /// renewed before being handed out.
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,

    /// Timeout for a single renewal HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renewal_url: String::new(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SessionConfig {
    /// Check if the session config has the minimum required fields for
    /// renewal over the network.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.renewal_url.is_empty()
    }

    /// Renewal lead time as a `TimeDelta` for expiry arithmetic.
    #[must_use]
    pub fn threshold(&self) -> TimeDelta {
        TimeDelta::seconds(i64::try_from(self.refresh_threshold_secs).unwrap_or(i64::MAX))
    }

    /// Renewal request timeout as a std `Duration` for the HTTP client.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_configured() {
        let config = SessionConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.refresh_threshold_secs, 60);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn configured_when_url_set() {
        let config = SessionConfig {
            renewal_url: "https://api.vend.example/v1/session/renew".into(),
            ..Default::default()
        };
        assert!(config.is_configured());
    }

    #[test]
    fn threshold_converts_to_time_delta() {
        let config = SessionConfig {
            refresh_threshold_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.threshold(), TimeDelta::seconds(90));
    }

    #[test]
    fn request_timeout_converts_to_duration() {
        let config = SessionConfig {
            request_timeout_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }
}
