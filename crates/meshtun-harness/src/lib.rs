//! Meshtun Harness
//!
//! In-memory doubles for every collaborator a tunnel session talks to: a scripted mesh
//! engine, a host platform whose virtual interface is a pair of packet queues, a manually
//! advanced clock, and a probe for asserting on status broadcasts. Used by the runtime's
//! tests and by the CLI's loopback demo.

pub mod clock;
pub mod engine;
pub mod platform;
pub mod probe;

pub use clock::ManualTimeSource;
pub use engine::{EngineStatus, MockEngine, MockEngineFactory};
pub use platform::{EstablishMode, MemoryDevice, MemoryPlatform, ScriptedFault};
pub use probe::{wait_until, EventProbe};
