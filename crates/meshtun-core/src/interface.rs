//! Virtual interface and platform contracts
//!
//! The session describes the interface it wants with an [`InterfaceBuilder`] and hands it to
//! the host's [`TunnelPlatform`], which owns OS-level creation and permissioning.

use crate::dns::DnsServerEntry;
use crate::errors::{InterfaceError, IoFault};
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Route Constants
// ----------------------------------------------------------------------------

/// Prefix length used for the node address and the mesh route
pub const MESH_PREFIX_LEN: u8 = 7;

/// Whole mesh address space (`200::/7`)
pub const MESH_ROUTE: Ipv6Addr = Ipv6Addr::new(0x200, 0, 0, 0, 0, 0, 0, 0);

/// Single global-unicast host route (`2000::/128`). Makes stub resolvers believe the device has
/// regular IPv6 so they issue AAAA queries, which mesh names depend on.
pub const AAAA_HINT_ROUTE: Ipv6Addr = Ipv6Addr::new(0x2000, 0, 0, 0, 0, 0, 0, 0);

/// Google public resolver, routed through the tunnel when the browser fix is enabled
pub const CHROME_FIX_ROUTE: Ipv6Addr = Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888);

// ----------------------------------------------------------------------------
// Interface Builder
// ----------------------------------------------------------------------------

/// Address family the interface is allowed to carry in addition to the mesh family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// Address or route with prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl Prefix {
    pub fn new(address: impl Into<IpAddr>, prefix_len: u8) -> Self {
        Self {
            address: address.into(),
            prefix_len,
        }
    }
}

/// Description of the virtual interface to establish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceBuilder {
    pub addresses: Vec<Prefix>,
    pub routes: Vec<Prefix>,
    pub allowed_families: Vec<AddressFamily>,
    pub allow_bypass: bool,
    pub blocking: bool,
    pub mtu: Option<u16>,
    /// `None` when the platform has no notion of metered interfaces
    pub metered: Option<bool>,
    pub dns_servers: Vec<DnsServerEntry>,
    pub session_name: Option<String>,
}

impl InterfaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address(mut self, address: impl Into<IpAddr>, prefix_len: u8) -> Self {
        self.addresses.push(Prefix::new(address, prefix_len));
        self
    }

    pub fn add_route(mut self, address: impl Into<IpAddr>, prefix_len: u8) -> Self {
        self.routes.push(Prefix::new(address, prefix_len));
        self
    }

    pub fn allow_family(mut self, family: AddressFamily) -> Self {
        if !self.allowed_families.contains(&family) {
            self.allowed_families.push(family);
        }
        self
    }

    pub fn allow_bypass(mut self) -> Self {
        self.allow_bypass = true;
        self
    }

    pub fn set_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn set_mtu(mut self, mtu: u16) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn set_metered(mut self, metered: bool) -> Self {
        self.metered = Some(metered);
        self
    }

    /// Only validated entries can be added
    pub fn add_dns_server(mut self, server: DnsServerEntry) -> Self {
        self.dns_servers.push(server);
        self
    }

    pub fn set_session(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    pub fn has_route(&self, address: impl Into<IpAddr>, prefix_len: u8) -> bool {
        self.routes.contains(&Prefix::new(address, prefix_len))
    }
}

// ----------------------------------------------------------------------------
// Device Streams
// ----------------------------------------------------------------------------

/// Read half of the interface, owned by the inbound pump
///
/// Dropping the reader releases it.
pub trait PacketReader: Send {
    /// Read one packet; `Ok(0)` means the interface reached end of stream
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, IoFault>;
}

/// Write half of the interface, owned by the outbound pump
///
/// Dropping the writer releases it.
pub trait PacketWriter: Send {
    fn write_packet(&mut self, packet: &[u8]) -> Result<(), IoFault>;
}

/// Established virtual interface handle
pub trait TunDevice: Send + Sync {
    /// False once the handle was closed or the OS revoked it
    fn is_valid(&self) -> bool;

    fn reader(&self) -> Result<Box<dyn PacketReader>, InterfaceError>;

    fn writer(&self) -> Result<Box<dyn PacketWriter>, InterfaceError>;

    /// Close the handle. Must unblock pending reads and writes on its streams.
    fn close(&self);
}

// ----------------------------------------------------------------------------
// Platform
// ----------------------------------------------------------------------------

/// Held multicast capability (peer discovery on the local link needs it on some platforms)
pub trait MulticastLock: Send {
    fn release(&mut self);
}

/// Host platform services needed to bring a tunnel up
pub trait TunnelPlatform: Send + Sync {
    fn acquire_multicast(&self, tag: &str) -> Result<Box<dyn MulticastLock>, InterfaceError>;

    /// Whether the platform understands the metered flag
    fn supports_metered(&self) -> bool {
        false
    }

    /// Create the interface; the returned handle may still be invalid
    fn establish(&self, builder: InterfaceBuilder) -> Result<Arc<dyn TunDevice>, InterfaceError>;
}
