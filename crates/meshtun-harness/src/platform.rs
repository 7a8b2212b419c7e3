//! In-memory platform and virtual interface
//!
//! `MemoryPlatform` records every interface request and multicast acquisition;
//! `MemoryDevice` is a packet queue pair whose reader blocks until a packet arrives or the
//! device is closed. Stream handles count their own releases so tests can check that each
//! is dropped exactly once.

use meshtun_core::{
    InterfaceBuilder, InterfaceError, IoFault, MulticastLock, PacketReader, PacketWriter,
    TunDevice, TunnelPlatform,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// Scripted Faults
// ----------------------------------------------------------------------------

/// Failure to inject into a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFault {
    /// Kernel buffer exhaustion (transient)
    BufferFull,
    /// Any unrecoverable I/O failure
    Broken,
}

impl ScriptedFault {
    fn into_fault(self) -> IoFault {
        match self {
            ScriptedFault::BufferFull => IoFault::buffer_full(),
            ScriptedFault::Broken => IoFault::Fatal(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted failure",
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Memory Device
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DeviceState {
    valid: bool,
    closed: bool,
    end_of_stream: bool,
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    write_faults: VecDeque<ScriptedFault>,
    read_fault: Option<ScriptedFault>,
    write_attempts: usize,
}

#[derive(Debug, Default)]
struct DeviceShared {
    state: Mutex<DeviceState>,
    ready: Condvar,
    readers_released: AtomicUsize,
    writers_released: AtomicUsize,
}

/// In-memory [`TunDevice`]
#[derive(Debug)]
pub struct MemoryDevice {
    shared: Arc<DeviceShared>,
}

impl MemoryDevice {
    pub fn new(valid: bool) -> Self {
        let shared = DeviceShared::default();
        shared.state.lock().valid = valid;
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Queue a packet as if an application had written it to the interface
    pub fn inject_packet(&self, packet: &[u8]) {
        self.shared.state.lock().inbound.push_back(packet.to_vec());
        self.shared.ready.notify_all();
    }

    /// Packets the outbound pump wrote to the interface
    pub fn written_packets(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().written.clone()
    }

    /// Wait until at least `count` packets were written
    pub fn wait_for_written(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.written.len() < count {
            if self.shared.ready.wait_until(&mut state, deadline).timed_out() {
                return state.written.len() >= count;
            }
        }
        true
    }

    /// Faults returned by the next writes, in order
    pub fn script_write_faults(&self, faults: impl IntoIterator<Item = ScriptedFault>) {
        self.shared.state.lock().write_faults.extend(faults);
    }

    pub fn fail_next_read(&self, fault: ScriptedFault) {
        self.shared.state.lock().read_fault = Some(fault);
        self.shared.ready.notify_all();
    }

    /// Make blocked and future reads return end of stream
    pub fn signal_end_of_stream(&self) {
        self.shared.state.lock().end_of_stream = true;
        self.shared.ready.notify_all();
    }

    /// Invalidate the handle without closing it, as when the OS revokes the interface
    pub fn revoke(&self) {
        self.shared.state.lock().valid = false;
        self.shared.ready.notify_all();
    }

    pub fn write_attempts(&self) -> usize {
        self.shared.state.lock().write_attempts
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn readers_released(&self) -> usize {
        self.shared.readers_released.load(Ordering::SeqCst)
    }

    pub fn writers_released(&self) -> usize {
        self.shared.writers_released.load(Ordering::SeqCst)
    }

    fn check_stream(&self, direction: &'static str) -> Result<(), InterfaceError> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(InterfaceError::StreamUnavailable {
                direction,
                reason: "interface closed".to_string(),
            });
        }
        if !state.valid {
            return Err(InterfaceError::InvalidHandle);
        }
        Ok(())
    }
}

impl TunDevice for MemoryDevice {
    fn is_valid(&self) -> bool {
        self.shared.state.lock().valid
    }

    fn reader(&self) -> Result<Box<dyn PacketReader>, InterfaceError> {
        self.check_stream("read")?;
        Ok(Box::new(MemoryReader {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn writer(&self) -> Result<Box<dyn PacketWriter>, InterfaceError> {
        self.check_stream("write")?;
        Ok(Box::new(MemoryWriter {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn close(&self) {
        let mut state = self.shared.state.lock();
        state.valid = false;
        state.closed = true;
        self.shared.ready.notify_all();
    }
}

fn closed_fault() -> IoFault {
    IoFault::Fatal(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "interface closed",
    ))
}

struct MemoryReader {
    shared: Arc<DeviceShared>,
}

impl PacketReader for MemoryReader {
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, IoFault> {
        let mut state = self.shared.state.lock();
        loop {
            if !state.valid {
                return Err(closed_fault());
            }
            if let Some(fault) = state.read_fault.take() {
                return Err(fault.into_fault());
            }
            if let Some(packet) = state.inbound.pop_front() {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }
            if state.end_of_stream {
                return Ok(0);
            }
            self.shared.ready.wait(&mut state);
        }
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.shared.readers_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryWriter {
    shared: Arc<DeviceShared>,
}

impl PacketWriter for MemoryWriter {
    fn write_packet(&mut self, packet: &[u8]) -> Result<(), IoFault> {
        let mut state = self.shared.state.lock();
        if !state.valid {
            return Err(closed_fault());
        }
        state.write_attempts += 1;
        if let Some(fault) = state.write_faults.pop_front() {
            return Err(fault.into_fault());
        }
        state.written.push(packet.to_vec());
        self.shared.ready.notify_all();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.shared.writers_released.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Memory Platform
// ----------------------------------------------------------------------------

/// How the next `establish` call behaves
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EstablishMode {
    #[default]
    Valid,
    /// Succeeds but hands back an invalid handle
    InvalidHandle,
    Fail(String),
}

#[derive(Debug, Default)]
struct PlatformState {
    establish: EstablishMode,
    multicast_failure: Option<String>,
    builders: Vec<InterfaceBuilder>,
    devices: Vec<Arc<MemoryDevice>>,
}

#[derive(Debug, Default)]
struct MulticastCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// In-memory [`TunnelPlatform`]
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<PlatformState>,
    multicast: Arc<MulticastCounters>,
    metered_supported: bool,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform that understands the metered flag
    pub fn with_metered_support() -> Self {
        Self {
            metered_supported: true,
            ..Self::default()
        }
    }

    pub fn set_establish_mode(&self, mode: EstablishMode) {
        self.state.lock().establish = mode;
    }

    pub fn fail_multicast(&self, reason: impl Into<String>) {
        self.state.lock().multicast_failure = Some(reason.into());
    }

    pub fn last_builder(&self) -> Option<InterfaceBuilder> {
        self.state.lock().builders.last().cloned()
    }

    pub fn last_device(&self) -> Option<Arc<MemoryDevice>> {
        self.state.lock().devices.last().cloned()
    }

    pub fn devices(&self) -> Vec<Arc<MemoryDevice>> {
        self.state.lock().devices.clone()
    }

    pub fn establish_count(&self) -> usize {
        self.state.lock().builders.len()
    }

    pub fn multicast_acquired(&self) -> usize {
        self.multicast.acquired.load(Ordering::SeqCst)
    }

    pub fn multicast_released(&self) -> usize {
        self.multicast.released.load(Ordering::SeqCst)
    }

    /// Multicast locks currently held
    pub fn multicast_held(&self) -> usize {
        self.multicast_acquired()
            .saturating_sub(self.multicast_released())
    }
}

impl TunnelPlatform for MemoryPlatform {
    fn acquire_multicast(&self, tag: &str) -> Result<Box<dyn MulticastLock>, InterfaceError> {
        if let Some(reason) = self.state.lock().multicast_failure.clone() {
            return Err(InterfaceError::MulticastUnavailable { reason });
        }
        self.multicast.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryMulticastLock {
            tag: tag.to_string(),
            released: false,
            counters: Arc::clone(&self.multicast),
        }))
    }

    fn supports_metered(&self) -> bool {
        self.metered_supported
    }

    fn establish(&self, builder: InterfaceBuilder) -> Result<Arc<dyn TunDevice>, InterfaceError> {
        let mut state = self.state.lock();
        state.builders.push(builder);
        let device = match state.establish.clone() {
            EstablishMode::Valid => MemoryDevice::new(true),
            EstablishMode::InvalidHandle => MemoryDevice::new(false),
            EstablishMode::Fail(reason) => {
                return Err(InterfaceError::EstablishFailed { reason });
            }
        };
        let device = Arc::new(device);
        state.devices.push(Arc::clone(&device));
        Ok(device)
    }
}

#[derive(Debug)]
struct MemoryMulticastLock {
    #[allow(dead_code)]
    tag: String,
    released: bool,
    counters: Arc<MulticastCounters>,
}

impl MulticastLock for MemoryMulticastLock {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryMulticastLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_fails_pending_writes() {
        let device = MemoryDevice::new(true);
        let mut writer = device.writer().unwrap();
        device.close();

        assert!(matches!(
            writer.write_packet(&[1]),
            Err(IoFault::Fatal(_))
        ));
        drop(writer);
        assert_eq!(device.writers_released(), 1);
    }

    #[test]
    fn test_scripted_write_faults_are_consumed_in_order() {
        let device = MemoryDevice::new(true);
        device.script_write_faults([ScriptedFault::BufferFull, ScriptedFault::Broken]);
        let mut writer = device.writer().unwrap();

        assert!(matches!(writer.write_packet(&[1]), Err(IoFault::Transient(_))));
        assert!(matches!(writer.write_packet(&[1]), Err(IoFault::Fatal(_))));
        assert!(writer.write_packet(&[1]).is_ok());
        assert_eq!(device.write_attempts(), 3);
    }

    #[test]
    fn test_streams_unavailable_after_close() {
        let device = MemoryDevice::new(true);
        device.close();

        assert!(matches!(
            device.reader(),
            Err(InterfaceError::StreamUnavailable {
                direction: "read",
                ..
            })
        ));
        assert!(matches!(
            MemoryDevice::new(false).writer(),
            Err(InterfaceError::InvalidHandle)
        ));
    }

    #[test]
    fn test_multicast_lock_released_once() {
        let platform = MemoryPlatform::new();
        let mut lock = platform.acquire_multicast("test").unwrap();
        lock.release();
        drop(lock);

        assert_eq!(platform.multicast_acquired(), 1);
        assert_eq!(platform.multicast_released(), 1);
    }
}
