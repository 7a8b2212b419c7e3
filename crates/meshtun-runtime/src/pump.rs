//! Packet pumps
//!
//! Two blocking loops move packets between the virtual interface and the engine. Neither
//! loop touches session state; they read the lifecycle, their own token and the device
//! handle, and return as soon as any of them says stop.
//!
//! Teardown unblocks them from the outside: `engine.stop()` wakes the outbound loop out of
//! `receive`, `device.close()` wakes the inbound loop out of `read_packet`.

use crate::cancel::CancelToken;
use crate::health::WorkerExit;
use crate::lifecycle::Lifecycle;
use meshtun_core::{MeshEngine, PacketReader, PacketWriter, TunDevice};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Largest packet either direction will move in one call
pub const MAX_PACKET_SIZE: usize = 65535;

/// Handles shared by both pump directions
#[derive(Clone)]
pub struct PumpContext {
    pub lifecycle: Arc<Lifecycle>,
    pub device: Arc<dyn TunDevice>,
    pub engine: Arc<dyn MeshEngine>,
}

impl PumpContext {
    /// Exit checks, in priority order
    fn exit_reason(&self, cancel: &CancelToken) -> Option<WorkerExit> {
        if !self.lifecycle.is_running() {
            Some(WorkerExit::Stopped)
        } else if cancel.is_cancelled() {
            Some(WorkerExit::Cancelled)
        } else if !self.device.is_valid() {
            Some(WorkerExit::InterfaceInvalid)
        } else {
            None
        }
    }
}

// ----------------------------------------------------------------------------
// Outbound (engine -> interface)
// ----------------------------------------------------------------------------

/// Run the outbound loop until told to stop or a write fails fatally
///
/// Takes ownership of the write handle and drops it on return.
pub fn run_outbound(
    ctx: PumpContext,
    cancel: CancelToken,
    mut writer: Box<dyn PacketWriter>,
) -> WorkerExit {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    let exit = loop {
        if let Some(exit) = ctx.exit_reason(&cancel) {
            break exit;
        }

        let len = match ctx.engine.receive(&mut buf) {
            Ok(len) => len,
            Err(e) => {
                // A receive interrupted by teardown is not a fault
                if let Some(exit) = ctx.exit_reason(&cancel) {
                    break exit;
                }
                break WorkerExit::Fatal(format!("engine receive failed: {}", e));
            }
        };
        if len == 0 {
            continue;
        }

        match writer.write_packet(&buf[..len]) {
            Ok(()) => trace!("Wrote {} bytes to interface", len),
            Err(fault) if fault.is_transient() => {
                debug!("Interface write dropped, buffer full: {}", fault);
            }
            Err(fault) => {
                if let Some(exit) = ctx.exit_reason(&cancel) {
                    break exit;
                }
                break WorkerExit::Fatal(format!("interface write failed: {}", fault));
            }
        }
    };

    drop(writer);
    debug!("Released interface write handle");
    exit
}

// ----------------------------------------------------------------------------
// Inbound (interface -> engine)
// ----------------------------------------------------------------------------

/// Run the inbound loop until told to stop, end of stream, or any I/O failure
///
/// Takes ownership of the read handle and drops it on return.
pub fn run_inbound(
    ctx: PumpContext,
    cancel: CancelToken,
    mut reader: Box<dyn PacketReader>,
) -> WorkerExit {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    let exit = loop {
        if let Some(exit) = ctx.exit_reason(&cancel) {
            break exit;
        }

        let len = match reader.read_packet(&mut buf) {
            Ok(0) => break WorkerExit::EndOfStream,
            Ok(len) => len,
            Err(fault) => {
                if let Some(exit) = ctx.exit_reason(&cancel) {
                    break exit;
                }
                break WorkerExit::Fatal(format!("interface read failed: {}", fault));
            }
        };

        if let Err(e) = ctx.engine.send(&buf[..len]) {
            if let Some(exit) = ctx.exit_reason(&cancel) {
                break exit;
            }
            warn!("Engine rejected {} byte packet: {}", len, e);
            break WorkerExit::Fatal(format!("engine send failed: {}", e));
        }
        trace!("Forwarded {} bytes to engine", len);
    };

    drop(reader);
    debug!("Released interface read handle");
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtun_harness::{EngineStatus, MemoryDevice, MockEngine, ScriptedFault};
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    // ------------------------------------------------------------------------
    // Test Utilities
    // ------------------------------------------------------------------------

    fn running_lifecycle() -> Arc<Lifecycle> {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.try_begin_start().unwrap();
        lifecycle.finish_start().unwrap();
        lifecycle
    }

    fn fixture() -> (PumpContext, Arc<MockEngine>, Arc<MemoryDevice>) {
        let engine = Arc::new(MockEngine::new(EngineStatus::default()));
        engine.start(b"{}").unwrap();
        let device = Arc::new(MemoryDevice::new(true));
        let ctx = PumpContext {
            lifecycle: running_lifecycle(),
            device: device.clone(),
            engine: engine.clone(),
        };
        (ctx, engine, device)
    }

    fn spawn_outbound(
        ctx: &PumpContext,
        device: &MemoryDevice,
    ) -> (CancelToken, thread::JoinHandle<WorkerExit>) {
        let cancel = CancelToken::new();
        let writer = device.writer().unwrap();
        let handle = {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            thread::spawn(move || run_outbound(ctx, cancel, writer))
        };
        (cancel, handle)
    }

    // ------------------------------------------------------------------------
    // Outbound Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_outbound_continues_after_buffer_full() {
        let (ctx, engine, device) = fixture();
        device.script_write_faults([ScriptedFault::BufferFull, ScriptedFault::BufferFull]);
        let (_cancel, handle) = spawn_outbound(&ctx, &device);

        engine.push_packet(&[1]);
        engine.push_packet(&[2]);
        engine.push_packet(&[3]);
        assert!(device.wait_for_written(1, WAIT));
        assert_eq!(device.written_packets(), vec![vec![3]]);
        assert_eq!(device.write_attempts(), 3);

        ctx.lifecycle.try_begin_stop().unwrap();
        engine.stop();
        assert_eq!(handle.join().unwrap(), WorkerExit::Stopped);
        assert_eq!(device.writers_released(), 1);
    }

    #[test]
    fn test_outbound_terminates_on_fatal_write() {
        let (ctx, engine, device) = fixture();
        device.script_write_faults([ScriptedFault::Broken]);
        let (_cancel, handle) = spawn_outbound(&ctx, &device);

        engine.push_packet(&[9, 9]);
        let exit = handle.join().unwrap();

        assert!(matches!(exit, WorkerExit::Fatal(_)));
        assert_eq!(device.writers_released(), 1);
        assert!(device.written_packets().is_empty());
    }

    #[test]
    fn test_outbound_stop_is_not_a_fault() {
        let (ctx, engine, device) = fixture();
        let (_cancel, handle) = spawn_outbound(&ctx, &device);

        thread::sleep(Duration::from_millis(20));
        ctx.lifecycle.try_begin_stop().unwrap();
        engine.stop();

        assert_eq!(handle.join().unwrap(), WorkerExit::Stopped);
        assert_eq!(device.writers_released(), 1);
    }

    #[test]
    fn test_outbound_exits_on_invalid_interface() {
        let (ctx, engine, device) = fixture();
        let writer = device.writer().unwrap();
        engine.push_packet(&[7, 7]);
        device.revoke();

        let exit = run_outbound(ctx, CancelToken::new(), writer);

        assert_eq!(exit, WorkerExit::InterfaceInvalid);
        assert_eq!(engine.pending_packets(), 1);
        assert_eq!(device.write_attempts(), 0);
        assert!(device.written_packets().is_empty());
        assert_eq!(device.writers_released(), 1);
    }

    // ------------------------------------------------------------------------
    // Inbound Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_inbound_forwards_exact_bytes() {
        let (ctx, engine, device) = fixture();
        let cancel = CancelToken::new();
        let reader = device.reader().unwrap();
        let handle = {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            thread::spawn(move || run_inbound(ctx, cancel, reader))
        };

        device.inject_packet(&[0x60, 0, 0, 0, 1, 2]);
        assert!(engine.wait_for_sent(1, WAIT));
        assert_eq!(engine.sent_packets(), vec![vec![0x60, 0, 0, 0, 1, 2]]);

        cancel.cancel();
        device.close();
        assert_eq!(handle.join().unwrap(), WorkerExit::Cancelled);
        assert_eq!(device.readers_released(), 1);
    }

    #[test]
    fn test_inbound_end_of_stream() {
        let (ctx, _engine, device) = fixture();
        let reader = device.reader().unwrap();
        device.signal_end_of_stream();

        assert_eq!(
            run_inbound(ctx, CancelToken::new(), reader),
            WorkerExit::EndOfStream
        );
        assert_eq!(device.readers_released(), 1);
    }

    #[test]
    fn test_inbound_read_fault_is_fatal() {
        let (ctx, _engine, device) = fixture();
        let reader = device.reader().unwrap();
        device.fail_next_read(ScriptedFault::BufferFull);

        assert!(matches!(
            run_inbound(ctx, CancelToken::new(), reader),
            WorkerExit::Fatal(_)
        ));
    }

    #[test]
    fn test_inbound_engine_send_failure_is_fatal() {
        let (ctx, engine, device) = fixture();
        engine.fail_sends();
        let reader = device.reader().unwrap();
        device.inject_packet(&[1, 2, 3]);

        assert!(matches!(
            run_inbound(ctx, CancelToken::new(), reader),
            WorkerExit::Fatal(_)
        ));
    }

    #[test]
    fn test_cancelled_before_first_iteration() {
        let (ctx, _engine, device) = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();

        let reader = device.reader().unwrap();
        assert_eq!(run_inbound(ctx, cancel, reader), WorkerExit::Cancelled);
    }
}
