//! DNS resolver list validation
//!
//! The interface builder only accepts bare IP literals, while users type free-form lists.
//! Entries that carry a port or fail to parse are dropped with a warning so that one bad
//! address never keeps the tunnel from coming up.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{info, warn};

// ----------------------------------------------------------------------------
// DNS Server Entry
// ----------------------------------------------------------------------------

/// A validated DNS resolver address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsServerEntry(IpAddr);

impl DnsServerEntry {
    pub fn addr(&self) -> IpAddr {
        self.0
    }
}

impl fmt::Display for DnsServerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an entry was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsRejection {
    /// `ipv4:port` or `[ipv6]:port`
    EmbeddedPort,
    /// Anything that is not an IP literal
    Malformed,
}

impl fmt::Display for DnsRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsRejection::EmbeddedPort => write!(f, "contains a port"),
            DnsRejection::Malformed => write!(f, "not an IP address"),
        }
    }
}

// ----------------------------------------------------------------------------
// Validation
// ----------------------------------------------------------------------------

/// Validate a single, already-trimmed entry
pub fn classify_dns_entry(entry: &str) -> Result<DnsServerEntry, DnsRejection> {
    if entry.contains("]:") || is_ipv4_with_port(entry) {
        return Err(DnsRejection::EmbeddedPort);
    }

    let candidate = entry
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(entry);

    candidate
        .parse::<IpAddr>()
        .map(DnsServerEntry)
        .map_err(|_| DnsRejection::Malformed)
}

/// Parse a comma-separated resolver list, keeping valid entries in order
pub fn parse_dns_servers(raw: &str) -> Vec<DnsServerEntry> {
    parse_dns_servers_detailed(raw)
        .into_iter()
        .filter_map(|(entry, outcome)| match outcome {
            Ok(server) => {
                info!("Adding DNS server: {}", server);
                Some(server)
            }
            Err(reason) => {
                warn!("Skipping invalid DNS server address {:?}: {}", entry, reason);
                None
            }
        })
        .collect()
}

/// Like [`parse_dns_servers`] but reports the outcome for every non-empty entry
pub fn parse_dns_servers_detailed(
    raw: &str,
) -> Vec<(String, Result<DnsServerEntry, DnsRejection>)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| (entry.to_string(), classify_dns_entry(entry)))
        .collect()
}

fn is_ipv4_with_port(entry: &str) -> bool {
    let mut parts = entry.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => {
            host.parse::<Ipv4Addr>().is_ok() && port.parse::<u32>().is_ok()
        }
        _ => false,
    }
}
