//! Meshtun Core
//!
//! Foundational types for the meshtun tunnel session manager: the error taxonomy, session
//! configuration, DNS resolver validation, the contracts of the external collaborators (mesh
//! engine, virtual interface, host platform) and the status values broadcast to observers.
//!
//! The session state machine itself lives in `meshtun-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod dns;
pub mod engine;
pub mod errors;
pub mod interface;
pub mod status;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{TimingConfig, TunnelConfig};
pub use dns::{classify_dns_entry, parse_dns_servers, DnsRejection, DnsServerEntry};
pub use engine::{EngineFactory, MeshEngine};
pub use errors::{
    ConfigError, EngineError, InterfaceError, IoFault, TunnelError, TunnelResult,
};
pub use interface::{
    AddressFamily, InterfaceBuilder, MulticastLock, PacketReader, PacketWriter, Prefix,
    TunDevice, TunnelPlatform,
};
pub use status::{
    derive_connectivity, StatusBroadcaster, StatusEvent, StatusReceiver, StatusSnapshot,
    UiInterest, UpdateGate,
};
pub use types::{ConnectivityState, SessionState, SystemTimeSource, TimeSource, Timestamp};
