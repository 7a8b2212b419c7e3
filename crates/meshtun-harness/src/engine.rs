//! Scripted mesh engine
//!
//! `MockEngine` keeps a queue of packets to hand to the outbound pump and records everything
//! the inbound pump sends. `receive` blocks on a condvar until a packet is queued or the
//! engine is stopped, like a real engine would.

use meshtun_core::{EngineError, EngineFactory, MeshEngine};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

// ----------------------------------------------------------------------------
// Engine Status
// ----------------------------------------------------------------------------

/// Values returned by the engine's status queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub address: String,
    pub subnet: String,
    pub public_key: String,
    pub peers: String,
    pub routing_entries: u64,
    pub tree_report: Option<String>,
    pub mtu: u16,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            address: "200:dead:beef::1".to_string(),
            subnet: "300:dead:beef::/64".to_string(),
            public_key: hex::encode([0xab_u8; 32]),
            peers: "[]".to_string(),
            routing_entries: 0,
            tree_report: None,
            mtu: 65535,
        }
    }
}

// ----------------------------------------------------------------------------
// Mock Engine
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct EngineState {
    running: bool,
    start_failure: Option<String>,
    send_failure: bool,
    config: Option<Vec<u8>>,
    to_interface: VecDeque<Vec<u8>>,
    from_interface: Vec<Vec<u8>>,
    status: EngineStatus,
    starts: u32,
    stops: u32,
    retries: u32,
}

/// In-memory [`MeshEngine`]
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<EngineState>,
    ready: Condvar,
    loopback: bool,
}

impl MockEngine {
    pub fn new(status: EngineStatus) -> Self {
        Self {
            state: Mutex::new(EngineState {
                status,
                ..EngineState::default()
            }),
            ready: Condvar::new(),
            loopback: false,
        }
    }

    /// Engine that echoes every packet it is sent back towards the interface
    pub fn loopback(status: EngineStatus) -> Self {
        Self {
            loopback: true,
            ..Self::new(status)
        }
    }

    /// Make the next `start` call fail
    pub fn fail_start(&self, reason: impl Into<String>) {
        self.state.lock().start_failure = Some(reason.into());
    }

    /// Make every `send` fail with an I/O error
    pub fn fail_sends(&self) {
        self.state.lock().send_failure = true;
    }

    /// Queue a packet for the outbound pump
    pub fn push_packet(&self, packet: &[u8]) {
        self.state.lock().to_interface.push_back(packet.to_vec());
        self.ready.notify_all();
    }

    pub fn set_routing_entries(&self, count: u64) {
        self.state.lock().status.routing_entries = count;
    }

    pub fn set_tree_report(&self, report: Option<&str>) {
        self.state.lock().status.tree_report = report.map(str::to_string);
    }

    /// Packets queued for the outbound pump and not yet received
    pub fn pending_packets(&self) -> usize {
        self.state.lock().to_interface.len()
    }

    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        self.state.lock().from_interface.clone()
    }

    /// Wait until at least `count` packets were sent by the inbound pump
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.from_interface.len() < count {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return state.from_interface.len() >= count;
            }
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn last_config(&self) -> Option<Vec<u8>> {
        self.state.lock().config.clone()
    }

    pub fn start_count(&self) -> u32 {
        self.state.lock().starts
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().stops
    }

    pub fn retry_count(&self) -> u32 {
        self.state.lock().retries
    }
}

impl MeshEngine for MockEngine {
    fn start(&self, config: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.starts += 1;
        if let Some(reason) = state.start_failure.take() {
            return Err(EngineError::StartFailed { reason });
        }
        state.config = Some(config.to_vec());
        state.running = true;
        debug!("Mock engine started");
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stops += 1;
        state.running = false;
        self.ready.notify_all();
    }

    fn send(&self, packet: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(EngineError::Stopped);
        }
        if state.send_failure {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock send failure",
            )));
        }
        state.from_interface.push(packet.to_vec());
        if self.loopback {
            state.to_interface.push_back(packet.to_vec());
        }
        self.ready.notify_all();
        Ok(())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        loop {
            if !state.running {
                return Err(EngineError::Stopped);
            }
            if let Some(packet) = state.to_interface.pop_front() {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }
            self.ready.wait(&mut state);
        }
    }

    fn address(&self) -> String {
        self.state.lock().status.address.clone()
    }

    fn subnet(&self) -> String {
        self.state.lock().status.subnet.clone()
    }

    fn public_key(&self) -> String {
        self.state.lock().status.public_key.clone()
    }

    fn peers_report(&self) -> String {
        self.state.lock().status.peers.clone()
    }

    fn routing_entries(&self) -> u64 {
        self.state.lock().status.routing_entries
    }

    fn tree_report(&self) -> Option<String> {
        self.state.lock().status.tree_report.clone()
    }

    fn retry_peers_now(&self) {
        self.state.lock().retries += 1;
    }

    fn mtu(&self) -> u16 {
        self.state.lock().status.mtu
    }
}

// ----------------------------------------------------------------------------
// Mock Engine Factory
// ----------------------------------------------------------------------------

/// Factory that records every engine it creates
#[derive(Debug, Default)]
pub struct MockEngineFactory {
    status: Mutex<EngineStatus>,
    loopback: bool,
    fail_next_start: Mutex<Option<String>>,
    created: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: EngineStatus) -> Self {
        Self {
            status: Mutex::new(status),
            ..Self::default()
        }
    }

    pub fn loopback(status: EngineStatus) -> Self {
        Self {
            loopback: true,
            ..Self::with_status(status)
        }
    }

    /// The next engine created will refuse to start
    pub fn fail_next_start(&self, reason: impl Into<String>) {
        *self.fail_next_start.lock() = Some(reason.into());
    }

    pub fn last(&self) -> Option<Arc<MockEngine>> {
        self.created.lock().last().cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn engines(&self) -> Vec<Arc<MockEngine>> {
        self.created.lock().clone()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self) -> Arc<dyn MeshEngine> {
        let status = self.status.lock().clone();
        let engine = if self.loopback {
            MockEngine::loopback(status)
        } else {
            MockEngine::new(status)
        };
        if let Some(reason) = self.fail_next_start.lock().take() {
            engine.fail_start(reason);
        }
        let engine = Arc::new(engine);
        self.created.lock().push(Arc::clone(&engine));
        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_receive_unblocks_on_stop() {
        let engine = Arc::new(MockEngine::new(EngineStatus::default()));
        engine.start(b"{}").unwrap();

        let waiter = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                engine.receive(&mut buf)
            })
        };

        thread::sleep(Duration::from_millis(20));
        engine.stop();
        assert!(matches!(waiter.join().unwrap(), Err(EngineError::Stopped)));
    }

    #[test]
    fn test_loopback_echoes_sent_packets() {
        let engine = MockEngine::loopback(EngineStatus::default());
        engine.start(b"{}").unwrap();
        engine.send(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 16];
        let len = engine.receive(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
    }

    #[test]
    fn test_factory_applies_start_failure_once() {
        let factory = MockEngineFactory::new();
        factory.fail_next_start("boom");

        assert!(factory.create().start(b"{}").is_err());
        assert!(factory.create().start(b"{}").is_ok());
        assert_eq!(factory.created_count(), 2);
    }
}
