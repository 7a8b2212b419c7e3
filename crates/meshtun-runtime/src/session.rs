//! Tunnel session state machine
//!
//! A session owns, while running, exactly one engine, one interface handle, one multicast
//! lock and three workers. `start` and `stop` are all-or-nothing: the lifecycle guard picks
//! a single winner, the winner holds the resource slot for the whole transition, and a
//! failed start releases everything it acquired before returning.
//!
//! Teardown order is fixed: engine, interface, workers, multicast.

use crate::cancel::CancelToken;
use crate::health::{HealthBoard, WorkerHealth, WorkerKind};
use crate::lifecycle::{Lifecycle, Phase};
use crate::poller::Poller;
use crate::pump::{run_inbound, run_outbound, PumpContext};
use crate::worker::Worker;
use meshtun_core::interface::{AAAA_HINT_ROUTE, CHROME_FIX_ROUTE, MESH_PREFIX_LEN, MESH_ROUTE};
use meshtun_core::{
    parse_dns_servers, AddressFamily, ConnectivityState, DnsServerEntry, EngineError,
    EngineFactory, InterfaceBuilder, InterfaceError, MeshEngine, MulticastLock, SessionState,
    StatusBroadcaster, StatusEvent, StatusReceiver, StatusSnapshot, TimeSource, TunDevice,
    TunnelConfig, TunnelPlatform, TunnelResult, UpdateGate,
};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Outcome of a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call changed the session
    Applied,
    /// The session was already in (or moving to) the requested state
    Ignored,
}

// ----------------------------------------------------------------------------
// Session Resources
// ----------------------------------------------------------------------------

/// What a running session holds; partially filled while a start is in flight
#[derive(Default)]
struct Resources {
    multicast: Option<Box<dyn MulticastLock>>,
    engine: Option<Arc<dyn MeshEngine>>,
    device: Option<Arc<dyn TunDevice>>,
    workers: Vec<Worker>,
}

impl Resources {
    /// Tear down whatever is present and hand back the signalled workers
    fn release(mut self) -> Vec<Worker> {
        if let Some(engine) = self.engine.take() {
            engine.stop();
            debug!("Engine stopped");
        }
        if let Some(device) = self.device.take() {
            device.close();
            debug!("Interface closed");
        }
        for worker in &self.workers {
            worker.cancel();
        }
        if let Some(mut multicast) = self.multicast.take() {
            multicast.release();
            debug!("Multicast lock released");
        }
        std::mem::take(&mut self.workers)
    }
}

// ----------------------------------------------------------------------------
// Tunnel Session
// ----------------------------------------------------------------------------

/// The tunnel session manager
///
/// All control methods take `&self`; share the session behind an `Arc` to drive it from
/// several threads. Dropping the session stops it.
pub struct TunnelSession {
    config: TunnelConfig,
    engines: Arc<dyn EngineFactory>,
    platform: Arc<dyn TunnelPlatform>,
    clock: Arc<dyn TimeSource>,
    gate: Arc<dyn UpdateGate>,
    broadcaster: StatusBroadcaster,
    lifecycle: Arc<Lifecycle>,
    /// Held for a whole transition; the poller takes it to publish
    fence: Arc<Mutex<()>>,
    slot: Mutex<Option<Resources>>,
    retired: Mutex<Vec<Worker>>,
    /// Board of the latest start; retired workers keep writing to their own
    health: Mutex<Arc<HealthBoard>>,
}

impl TunnelSession {
    pub(crate) fn new(
        config: TunnelConfig,
        engines: Arc<dyn EngineFactory>,
        platform: Arc<dyn TunnelPlatform>,
        clock: Arc<dyn TimeSource>,
        gate: Arc<dyn UpdateGate>,
        broadcaster: StatusBroadcaster,
    ) -> Self {
        Self {
            config,
            engines,
            platform,
            clock,
            gate,
            broadcaster,
            lifecycle: Arc::new(Lifecycle::new()),
            fence: Arc::new(Mutex::new(())),
            slot: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
            health: Mutex::new(Arc::new(HealthBoard::new())),
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.broadcaster
    }

    /// Latest health of each worker started by the current (or last) session
    pub fn health(&self) -> Vec<(WorkerKind, WorkerHealth)> {
        self.health_board().snapshot()
    }

    /// Running with all three workers alive
    pub fn is_healthy(&self) -> bool {
        self.is_running() && self.health_board().all_running()
    }

    fn health_board(&self) -> Arc<HealthBoard> {
        Arc::clone(&self.health.lock())
    }

    // ------------------------------------------------------------------------
    // Control Operations
    // ------------------------------------------------------------------------

    /// Bring the tunnel up
    ///
    /// Returns `Ignored` if another call already owns the session. On error every resource
    /// acquired by this call has been released and the session is stopped.
    pub fn start(&self) -> TunnelResult<Transition> {
        if let Err(phase) = self.lifecycle.try_begin_start() {
            debug!("Start ignored, session is {:?}", phase);
            return Ok(Transition::Ignored);
        }

        let _fence = self.fence.lock();
        let mut slot = self.slot.lock();
        info!("Starting tunnel session '{}'", self.config.session_name);

        let mut acquired = Resources::default();
        match self.bring_up(&mut acquired) {
            Ok(()) => {
                *slot = Some(acquired);
                info!("Tunnel session running");
                self.broadcaster
                    .publish_connectivity(ConnectivityState::Enabled);
                Ok(Transition::Applied)
            }
            Err(e) => {
                error!("Tunnel start failed, rolling back: {}", e);
                let workers = acquired.release();
                self.retired.lock().extend(workers);
                // A stop that raced in after the running phase finishes the transition itself
                if self.lifecycle.abort_start().is_err()
                    && self
                        .lifecycle
                        .transition(Phase::Running, Phase::Stopped)
                        .is_err()
                {
                    debug!("Rollback handed over to concurrent stop");
                }
                Err(e)
            }
        }
    }

    /// Tear the tunnel down
    pub fn stop(&self) -> Transition {
        if let Err(phase) = self.lifecycle.try_begin_stop() {
            debug!("Stop ignored, session is {:?}", phase);
            return Transition::Ignored;
        }

        let _fence = self.fence.lock();
        let mut slot = self.slot.lock();
        info!("Stopping tunnel session");

        let Some(resources) = slot.take() else {
            // Start rolled back underneath us
            let _ = self.lifecycle.finish_stop();
            return Transition::Applied;
        };

        let workers = resources.release();
        self.retired.lock().extend(workers);
        if let Err(phase) = self.lifecycle.finish_stop() {
            warn!("Unexpected phase {:?} while finishing stop", phase);
        }

        self.broadcaster
            .publish(StatusEvent::State(StatusSnapshot::stopped()));
        self.broadcaster
            .publish_connectivity(ConnectivityState::Disabled);
        info!("Tunnel session stopped");
        Transition::Applied
    }

    /// Ask the engine to retry its peers now; does nothing unless running
    pub fn connect(&self) -> Transition {
        if !self.is_running() {
            debug!("Connect ignored, session not running");
            return Transition::Ignored;
        }
        let slot = self.slot.lock();
        match slot.as_ref().and_then(|r| r.engine.as_ref()) {
            Some(engine) if self.is_running() => {
                info!("Retrying peer connections");
                engine.retry_peers_now();
                Transition::Applied
            }
            _ => Transition::Ignored,
        }
    }

    /// `stop` if running, otherwise `start`
    pub fn toggle(&self) -> TunnelResult<Transition> {
        if self.is_running() {
            Ok(self.stop())
        } else {
            self.start()
        }
    }

    /// Join workers signalled by earlier stops
    ///
    /// Returns `true` once none are left; workers still running at the deadline are kept for
    /// a later call.
    pub fn join_workers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = std::mem::take(&mut *self.retired.lock());

        loop {
            let (finished, rest): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(Worker::is_finished);
            for worker in finished {
                worker.join();
            }
            pending = rest;

            if pending.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("{} worker(s) still running after {:?}", pending.len(), timeout);
                self.retired.lock().extend(pending);
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
    }

    // ------------------------------------------------------------------------
    // Start Internals
    // ------------------------------------------------------------------------

    fn bring_up(&self, acquired: &mut Resources) -> TunnelResult<()> {
        let dns_servers = parse_dns_servers(&self.config.dns_servers);
        let engine_config = self.config.engine_config_bytes()?;
        debug!(
            "Engine configuration: {}",
            String::from_utf8_lossy(&engine_config)
        );

        acquired.multicast = Some(self.platform.acquire_multicast(&self.config.session_name)?);

        let engine = self.engines.create();
        engine.start(&engine_config)?;
        acquired.engine = Some(Arc::clone(&engine));

        let builder = self.interface_builder(engine.as_ref(), dns_servers)?;
        let device = self.platform.establish(builder)?;
        acquired.device = Some(Arc::clone(&device));
        if !device.is_valid() {
            return Err(InterfaceError::InvalidHandle.into());
        }

        let reader = device.reader()?;
        let writer = device.writer()?;

        let board = Arc::new(HealthBoard::new());
        *self.health.lock() = Arc::clone(&board);
        if let Err(phase) = self.lifecycle.finish_start() {
            warn!("Unexpected phase {:?} while finishing start", phase);
        }

        let pumps = PumpContext {
            lifecycle: Arc::clone(&self.lifecycle),
            device,
            engine: Arc::clone(&engine),
        };

        let outbound = pumps.clone();
        acquired.workers.push(Worker::spawn(
            WorkerKind::Outbound,
            Arc::clone(&board),
            move |cancel: CancelToken| run_outbound(outbound, cancel, writer),
        )?);

        let inbound = pumps;
        acquired.workers.push(Worker::spawn(
            WorkerKind::Inbound,
            Arc::clone(&board),
            move |cancel: CancelToken| run_inbound(inbound, cancel, reader),
        )?);

        let poller = Poller {
            lifecycle: Arc::clone(&self.lifecycle),
            engine,
            clock: Arc::clone(&self.clock),
            gate: Arc::clone(&self.gate),
            broadcaster: self.broadcaster.clone(),
            timing: self.config.timing,
            fence: Arc::clone(&self.fence),
        };
        acquired.workers.push(Worker::spawn(
            WorkerKind::Poller,
            Arc::clone(&board),
            move |cancel: CancelToken| poller.run(cancel),
        )?);

        Ok(())
    }

    fn interface_builder(
        &self,
        engine: &dyn MeshEngine,
        dns_servers: Vec<DnsServerEntry>,
    ) -> TunnelResult<InterfaceBuilder> {
        let raw = engine.address();
        let address: IpAddr = raw
            .parse()
            .map_err(|_| EngineError::InvalidAddress { address: raw.clone() })?;

        let mut builder = InterfaceBuilder::new()
            .add_address(address, MESH_PREFIX_LEN)
            .add_route(MESH_ROUTE, MESH_PREFIX_LEN)
            .add_route(AAAA_HINT_ROUTE, 128)
            .allow_family(AddressFamily::Ipv4)
            .allow_bypass()
            .set_blocking(true)
            .set_mtu(engine.mtu())
            .set_session(self.config.session_name.as_str());

        if self.platform.supports_metered() {
            builder = builder.set_metered(false);
        }
        for server in dns_servers {
            builder = builder.add_dns_server(server);
        }
        if self.config.enable_chrome_fix {
            builder = builder.add_route(CHROME_FIX_ROUTE, 128);
        }

        Ok(builder)
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.stop();
    }
}
