//! Meshtun Runtime
//!
//! The tunnel session state machine and its background workers: two packet pumps moving
//! traffic between the virtual interface and the mesh engine, and a status poller deriving
//! connectivity for observers. Each worker runs on a named OS thread with its own
//! cancellation token.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod cancel;
pub mod health;
pub mod host;
pub mod lifecycle;
pub mod poller;
pub mod pump;
pub mod session;
pub mod worker;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::SessionBuilder;
pub use cancel::CancelToken;
pub use health::{HealthBoard, WorkerExit, WorkerHealth, WorkerKind};
pub use host::{HostCommand, Residency};
pub use pump::MAX_PACKET_SIZE;
pub use session::{Transition, TunnelSession};
