//! Background worker threads
//!
//! Each worker runs on its own named OS thread with a private [`CancelToken`]. The thread
//! logs its exit reason and records it on the [`HealthBoard`] it was spawned with before returning.

use crate::cancel::CancelToken;
use crate::health::{HealthBoard, WorkerExit, WorkerHealth, WorkerKind};
use meshtun_core::{TunnelError, TunnelResult};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Handle to a spawned worker thread
#[derive(Debug)]
pub struct Worker {
    kind: WorkerKind,
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body` on a thread named `meshtun-<kind>`
    pub fn spawn<F>(kind: WorkerKind, health: Arc<HealthBoard>, body: F) -> TunnelResult<Self>
    where
        F: FnOnce(CancelToken) -> WorkerExit + Send + 'static,
    {
        let token = CancelToken::new();
        let thread_token = token.clone();

        health.record(kind, WorkerHealth::Running);
        let board = Arc::clone(&health);
        let spawned = thread::Builder::new()
            .name(format!("meshtun-{}", kind))
            .spawn(move || {
                debug!("{} worker started", kind);
                let exit = body(thread_token);
                match &exit {
                    WorkerExit::Fatal(_) => error!("{} worker terminated: {}", kind, exit),
                    exit if exit.is_orderly() => info!("{} worker exited: {}", kind, exit),
                    _ => warn!("{} worker exited: {}", kind, exit),
                }
                board.record(kind, WorkerHealth::from(&exit));
            });

        match spawned {
            Ok(handle) => Ok(Self {
                kind,
                token,
                handle,
            }),
            Err(source) => {
                health.record(kind, WorkerHealth::Failed(source.to_string()));
                Err(TunnelError::WorkerSpawn {
                    worker: kind.as_str(),
                    source,
                })
            }
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread; returns `false` if it panicked
    pub fn join(self) -> bool {
        let kind = self.kind;
        match self.handle.join() {
            Ok(()) => true,
            Err(_) => {
                error!("{} worker panicked", kind);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_is_recorded_on_board() {
        let board = Arc::new(HealthBoard::new());
        let worker = Worker::spawn(WorkerKind::Inbound, Arc::clone(&board), |_| {
            WorkerExit::EndOfStream
        })
        .unwrap();

        assert!(worker.join());
        assert_eq!(
            board.get(WorkerKind::Inbound),
            Some(WorkerHealth::Exited("interface end of stream".to_string()))
        );
    }

    #[test]
    fn test_cancel_reaches_body() {
        let board = Arc::new(HealthBoard::new());
        let worker = Worker::spawn(WorkerKind::Poller, Arc::clone(&board), |token| {
            if token.sleep(Duration::from_secs(30)) {
                WorkerExit::Stopped
            } else {
                WorkerExit::Cancelled
            }
        })
        .unwrap();

        assert_eq!(board.get(WorkerKind::Poller), Some(WorkerHealth::Running));
        worker.cancel();
        assert!(worker.join());
        assert_eq!(
            board.get(WorkerKind::Poller),
            Some(WorkerHealth::Exited("cancelled".to_string()))
        );
    }

    #[test]
    fn test_thread_is_named_after_kind() {
        let board = Arc::new(HealthBoard::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Worker::spawn(WorkerKind::Outbound, board, move |_| {
            let _ = tx.send(thread::current().name().map(str::to_string));
            WorkerExit::Stopped
        })
        .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some("meshtun-outbound"));
        worker.join();
    }
}
