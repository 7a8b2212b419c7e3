//! Mesh engine handle contract
//!
//! The routing engine is an external component. The session only needs the calls below; a
//! fresh engine is created by an [`EngineFactory`] on every start and dropped on stop.

use crate::errors::EngineError;
use std::sync::Arc;

/// Handle to a running mesh-routing engine
///
/// All methods take `&self`: the outbound pump, inbound pump and status poller call into the
/// same engine concurrently from their own threads.
pub trait MeshEngine: Send + Sync {
    /// Start the engine with its serialized configuration
    fn start(&self, config: &[u8]) -> Result<(), EngineError>;

    /// Stop the engine. Must unblock any thread waiting in [`MeshEngine::receive`].
    fn stop(&self);

    /// Hand one packet read from the interface to the engine
    fn send(&self, packet: &[u8]) -> Result<(), EngineError>;

    /// Block until the engine has a packet for the interface; returns its length
    fn receive(&self, buf: &mut [u8]) -> Result<usize, EngineError>;

    /// Tunnel address assigned to this node
    fn address(&self) -> String;

    /// Routed subnet owned by this node
    fn subnet(&self) -> String;

    /// Public identity string
    fn public_key(&self) -> String;

    /// Opaque serialized peer list (JSON)
    fn peers_report(&self) -> String;

    /// Number of active routing table entries
    fn routing_entries(&self) -> u64;

    /// Serialized spanning-tree report (a JSON list), if the engine has one
    fn tree_report(&self) -> Option<String>;

    /// Retry outbound peer connections immediately
    fn retry_peers_now(&self);

    /// MTU the interface should be configured with
    fn mtu(&self) -> u16;
}

/// Creates a new engine handle for each session start
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn MeshEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Arc<dyn MeshEngine> + Send + Sync,
{
    fn create(&self) -> Arc<dyn MeshEngine> {
        self()
    }
}
