//! Host command dispatch
//!
//! Maps the intents a host service receives onto session operations, and tells the host
//! whether it should keep the service resident afterwards.

use crate::session::TunnelSession;
use core::fmt;
use core::str::FromStr;
use tracing::{info, warn};

/// Intent delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Start,
    Stop,
    Toggle,
    Connect,
    /// Implicit or unrecognised start intent; starts only when the tunnel is enabled
    Resume,
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostCommand::Start => "start",
            HostCommand::Stop => "stop",
            HostCommand::Toggle => "toggle",
            HostCommand::Connect => "connect",
            HostCommand::Resume => "resume",
        };
        f.write_str(name)
    }
}

impl FromStr for HostCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(HostCommand::Start),
            "stop" => Ok(HostCommand::Stop),
            "toggle" => Ok(HostCommand::Toggle),
            "connect" => Ok(HostCommand::Connect),
            "resume" => Ok(HostCommand::Resume),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Whether the host should keep the service alive after handling a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Sticky,
    NotSticky,
}

impl TunnelSession {
    /// Apply a host intent
    ///
    /// Start failures are logged; the session is left stopped and the caller still gets a
    /// residency hint.
    pub fn dispatch(&self, command: HostCommand) -> Residency {
        info!("Host command: {}", command);
        match command {
            HostCommand::Start => {
                self.start_logged();
                Residency::Sticky
            }
            HostCommand::Stop => {
                self.stop();
                Residency::NotSticky
            }
            HostCommand::Connect => {
                if self.is_running() {
                    self.connect();
                } else {
                    self.start_logged();
                }
                Residency::Sticky
            }
            HostCommand::Toggle => {
                if self.is_running() {
                    self.stop();
                    Residency::NotSticky
                } else {
                    self.start_logged();
                    Residency::Sticky
                }
            }
            HostCommand::Resume => {
                if self.config().enabled {
                    self.start_logged();
                    Residency::Sticky
                } else {
                    Residency::NotSticky
                }
            }
        }
    }

    fn start_logged(&self) {
        if let Err(e) = self.start() {
            warn!("Host-requested start failed: {}", e);
        }
    }
}
