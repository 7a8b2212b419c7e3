//! Status values and observer fan-out
//!
//! Two kinds of notifications leave the session: detailed snapshots for an active UI and
//! coarse connectivity for passive consumers. Both travel over one broadcast channel;
//! publishing never waits for observers.

use crate::engine::MeshEngine;
use crate::types::ConnectivityState;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::{trace, warn};

// ----------------------------------------------------------------------------
// Status Snapshot
// ----------------------------------------------------------------------------

/// Point-in-time session status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub started: bool,
    pub address: String,
    pub subnet: String,
    pub public_key: String,
    /// Opaque serialized peer list as reported by the engine
    pub peers: String,
    pub connectivity: ConnectivityState,
}

impl StatusSnapshot {
    /// Capture the engine's current identity and peers
    pub fn capture(engine: &dyn MeshEngine, connectivity: ConnectivityState) -> Self {
        Self {
            started: true,
            address: engine.address(),
            subnet: engine.subnet(),
            public_key: engine.public_key(),
            peers: engine.peers_report(),
            connectivity,
        }
    }

    /// Snapshot broadcast when the session goes down
    pub fn stopped() -> Self {
        Self {
            started: false,
            address: String::new(),
            subnet: String::new(),
            public_key: String::new(),
            peers: String::new(),
            connectivity: ConnectivityState::Disabled,
        }
    }
}

/// Notification delivered to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusEvent {
    /// Detailed lifecycle snapshot
    State(StatusSnapshot),
    /// Coarse connectivity change
    Connectivity { state: ConnectivityState },
}

// ----------------------------------------------------------------------------
// Connectivity Derivation
// ----------------------------------------------------------------------------

/// Count entries in a serialized tree report
///
/// Returns `None` for an absent report, the JSON literal `null`, or anything that is not a
/// JSON array.
pub fn tree_entry_count(report: Option<&str>) -> Option<usize> {
    let report = report?.trim();
    if report.is_empty() || report == "null" {
        return None;
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(report) {
        Ok(entries) => Some(entries.len()),
        Err(e) => {
            warn!("Ignoring unparsable tree report: {}", e);
            None
        }
    }
}

/// Derive coarse connectivity for a running session
pub fn derive_connectivity(routing_entries: u64, tree_report: Option<&str>) -> ConnectivityState {
    let mut state = ConnectivityState::Enabled;
    if routing_entries > 0 {
        state = ConnectivityState::Connected;
    }
    if tree_entry_count(tree_report).is_some_and(|count| count > 1) {
        state = ConnectivityState::Connected;
    }
    state
}

// ----------------------------------------------------------------------------
// Update Gate
// ----------------------------------------------------------------------------

/// Whether the host currently wants detailed snapshots
pub trait UpdateGate: Send + Sync {
    fn needs_updates(&self) -> bool;
}

/// Switchable gate, flipped by the host when its UI becomes visible or hidden
#[derive(Debug, Default)]
pub struct UiInterest(AtomicBool);

impl UiInterest {
    pub fn new(initial: bool) -> Self {
        Self(AtomicBool::new(initial))
    }

    pub fn set(&self, wanted: bool) {
        self.0.store(wanted, Ordering::Release);
    }
}

impl UpdateGate for UiInterest {
    fn needs_updates(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ----------------------------------------------------------------------------
// Broadcaster
// ----------------------------------------------------------------------------

pub type StatusReceiver = broadcast::Receiver<StatusEvent>;

/// Fire-and-forget fan-out of [`StatusEvent`]s
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StatusEvent) {
        // No subscribers is not an error; slow ones lag instead of blocking us
        if self.sender.send(event).is_err() {
            trace!("Status event dropped, no observers");
        }
    }

    pub fn publish_connectivity(&self, state: ConnectivityState) {
        self.publish(StatusEvent::Connectivity { state });
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}
