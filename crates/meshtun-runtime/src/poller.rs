//! Status poller
//!
//! Samples the engine on a fixed cadence. Detailed snapshots go out on every tick while the
//! host wants them; coarse connectivity goes out at most once per state interval regardless.

use crate::cancel::CancelToken;
use crate::health::WorkerExit;
use crate::lifecycle::Lifecycle;
use meshtun_core::{
    derive_connectivity, ConnectivityState, MeshEngine, StatusBroadcaster, StatusEvent,
    StatusSnapshot, TimeSource, TimingConfig, UpdateGate,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Everything the poller reads, captured at session start
pub struct Poller {
    pub lifecycle: Arc<Lifecycle>,
    pub engine: Arc<dyn MeshEngine>,
    pub clock: Arc<dyn TimeSource>,
    pub gate: Arc<dyn UpdateGate>,
    pub broadcaster: StatusBroadcaster,
    pub timing: TimingConfig,
    /// Held by the session across each transition
    pub fence: Arc<Mutex<()>>,
}

impl Poller {
    pub fn run(self, cancel: CancelToken) -> WorkerExit {
        if !cancel.sleep(self.timing.initial_delay()) {
            return WorkerExit::Cancelled;
        }

        let state_interval = self.timing.state_interval();
        let mut last_state = self.clock.now();
        let mut connectivity = ConnectivityState::Enabled;

        loop {
            if !self.lifecycle.is_running() {
                return WorkerExit::Stopped;
            }
            if cancel.is_cancelled() {
                return WorkerExit::Cancelled;
            }

            let tree = self.engine.tree_report();

            if self.gate.needs_updates() {
                let snapshot = StatusSnapshot::capture(self.engine.as_ref(), connectivity);
                if !self.publish(StatusEvent::State(snapshot)) {
                    return WorkerExit::Stopped;
                }
            }

            let now = self.clock.now();
            if now.duration_since(last_state) > state_interval {
                connectivity = derive_connectivity(self.engine.routing_entries(), tree.as_deref());
                debug!("Connectivity is {}", connectivity);
                if !self.publish(StatusEvent::Connectivity {
                    state: connectivity,
                }) {
                    return WorkerExit::Stopped;
                }
                last_state = now;
            }

            if cancel.is_cancelled() {
                return WorkerExit::Cancelled;
            }
            if !cancel.sleep(self.timing.poll_interval()) {
                return WorkerExit::Cancelled;
            }
        }
    }

    /// Publish unless the session left the running phase; serialized with transitions
    fn publish(&self, event: StatusEvent) -> bool {
        let _fence = self.fence.lock();
        if !self.lifecycle.is_running() {
            trace!("Dropping poller event, session no longer running");
            return false;
        }
        self.broadcaster.publish(event);
        true
    }
}
