//! meshtun CLI Configuration
//!
//! One TOML file holds the tunnel configuration plus the CLI's own settings. Every section
//! and field is optional; missing values fall back to defaults.
//!
//! ```toml
//! [tunnel]
//! enabled = true
//! dns_servers = "1.1.1.1, [2606:4700:4700::1111]"
//!
//! [tunnel.engine]
//! Peers = ["tls://198.51.100.7:443"]
//!
//! [ui]
//! live_updates = true
//!
//! [demo]
//! loopback = true
//! ```

use crate::error::{CliError, Result};
use anyhow::Context;
use meshtun_core::TunnelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the meshtun CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tunnel: TunnelConfig,
    pub ui: UiConfig,
    pub demo: DemoConfig,
}

/// Observer-side settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Start with detailed snapshots enabled
    pub live_updates: bool,
    /// Status events buffered per observer before it starts lagging
    pub event_capacity: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            live_updates: false,
            event_capacity: 64,
        }
    }
}

/// Behaviour of the in-memory engine used by `run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub loopback: bool,
    /// Routing entries the engine reports
    pub routing_entries: u64,
    /// Tree report the engine returns, as JSON
    pub tree_report: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.tunnel.validate()?;
        if self.ui.event_capacity == 0 {
            return Err(CliError::Config(
                "ui.event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
