//! Session Configuration
//!
//! Everything the session reads at start: the opaque engine configuration, the user-facing
//! tunnel options and the poller cadence.

use crate::errors::ConfigError;
use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Timing Configuration
// ----------------------------------------------------------------------------

/// Status poller cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before the first status check
    pub initial_delay_ms: u64,
    /// Sleep between status checks
    pub poll_interval_ms: u64,
    /// Minimum gap between coarse connectivity broadcasts
    pub state_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            poll_interval_ms: 1_000,
            state_interval_ms: 10_000,
        }
    }
}

impl TimingConfig {
    /// Fast cadence for tests
    pub fn testing() -> Self {
        Self {
            initial_delay_ms: 0,
            poll_interval_ms: 10,
            state_interval_ms: 50,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn state_interval(&self) -> Duration {
        Duration::from_millis(self.state_interval_ms)
    }
}

// ----------------------------------------------------------------------------
// Tunnel Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for one tunnel session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Start automatically when the host resumes the service without an explicit action
    pub enabled: bool,
    /// Interface session name, also used as the multicast lock tag
    pub session_name: String,
    /// Raw comma-separated resolver list as entered by the user
    pub dns_servers: String,
    /// Route Google's public resolver through the tunnel
    pub enable_chrome_fix: bool,
    pub timing: TimingConfig,
    /// Engine configuration, passed through as JSON bytes
    pub engine: serde_json::Value,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            session_name: "meshtun".to_string(),
            dns_servers: String::new(),
            enable_chrome_fix: false,
            timing: TimingConfig::default(),
            engine: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

impl TunnelConfig {
    /// Configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            enabled: true,
            timing: TimingConfig::testing(),
            ..Self::default()
        }
    }

    /// Serialized engine configuration
    pub fn engine_config_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec(&self.engine)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "session_name",
                reason: "must not be empty".to_string(),
            });
        }

        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.timing.state_interval_ms < self.timing.poll_interval_ms {
            return Err(ConfigError::Invalid {
                field: "timing.state_interval_ms",
                reason: format!(
                    "must not be shorter than the poll interval ({}ms)",
                    self.timing.poll_interval_ms
                ),
            });
        }

        if !(self.engine.is_object() || self.engine.is_null()) {
            return Err(ConfigError::Invalid {
                field: "engine",
                reason: "must be a table".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TunnelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.initial_delay(), Duration::from_millis(500));
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.timing.state_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_session_name_rejected() {
        let config = TunnelConfig {
            session_name: "  ".to_string(),
            ..TunnelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "session_name",
                ..
            })
        ));
    }

    #[test]
    fn test_state_interval_shorter_than_poll_rejected() {
        let mut config = TunnelConfig::default();
        config.timing.state_interval_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_bytes_are_json() {
        let mut config = TunnelConfig::default();
        config.engine = serde_json::json!({ "Peers": ["tls://example.org:443"] });

        let bytes = config.engine_config_bytes().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["Peers"][0], "tls://example.org:443");
    }

    #[test]
    fn test_scalar_engine_config_rejected() {
        let config = TunnelConfig {
            engine: serde_json::json!(42),
            ..TunnelConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
