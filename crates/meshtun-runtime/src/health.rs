//! Worker health board
//!
//! Each background worker records how it ended. A worker that exits while the session is
//! still running leaves the session degraded; the board is how hosts find out.

use core::fmt;
use parking_lot::Mutex;
use std::collections::HashMap;

// ----------------------------------------------------------------------------
// Worker Identity
// ----------------------------------------------------------------------------

/// The three background workers of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkerKind {
    /// Engine -> interface
    Outbound,
    /// Interface -> engine
    Inbound,
    Poller,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 3] = [WorkerKind::Outbound, WorkerKind::Inbound, WorkerKind::Poller];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Outbound => "outbound",
            WorkerKind::Inbound => "inbound",
            WorkerKind::Poller => "poller",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Exit Reasons
// ----------------------------------------------------------------------------

/// Why a worker loop returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Session left the running phase
    Stopped,
    /// The worker's own token was cancelled
    Cancelled,
    InterfaceInvalid,
    /// Interface read returned zero bytes
    EndOfStream,
    Fatal(String),
}

impl WorkerExit {
    /// Exits caused by teardown rather than by a fault
    pub fn is_orderly(&self) -> bool {
        matches!(self, WorkerExit::Stopped | WorkerExit::Cancelled)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Stopped => write!(f, "session stopped"),
            WorkerExit::Cancelled => write!(f, "cancelled"),
            WorkerExit::InterfaceInvalid => write!(f, "interface handle invalid"),
            WorkerExit::EndOfStream => write!(f, "interface end of stream"),
            WorkerExit::Fatal(reason) => write!(f, "fatal: {}", reason),
        }
    }
}

// ----------------------------------------------------------------------------
// Health Status
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerHealth {
    Running,
    /// Ended without an I/O fault
    Exited(String),
    /// Ended on a fatal error
    Failed(String),
}

impl From<&WorkerExit> for WorkerHealth {
    fn from(exit: &WorkerExit) -> Self {
        match exit {
            WorkerExit::Fatal(reason) => WorkerHealth::Failed(reason.clone()),
            other => WorkerHealth::Exited(other.to_string()),
        }
    }
}

/// Latest health of every worker one session start spawned
#[derive(Debug, Default)]
pub struct HealthBoard {
    workers: Mutex<HashMap<WorkerKind, WorkerHealth>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: WorkerKind, health: WorkerHealth) {
        self.workers.lock().insert(kind, health);
    }

    pub fn get(&self, kind: WorkerKind) -> Option<WorkerHealth> {
        self.workers.lock().get(&kind).cloned()
    }

    /// All recorded workers, in a stable order
    pub fn snapshot(&self) -> Vec<(WorkerKind, WorkerHealth)> {
        let mut entries: Vec<_> = self
            .workers
            .lock()
            .iter()
            .map(|(kind, health)| (*kind, health.clone()))
            .collect();
        entries.sort_by_key(|(kind, _)| *kind);
        entries
    }

    /// True when every worker is recorded and still running
    pub fn all_running(&self) -> bool {
        let workers = self.workers.lock();
        WorkerKind::ALL
            .iter()
            .all(|kind| matches!(workers.get(kind), Some(WorkerHealth::Running)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_exit_maps_to_failed() {
        let exit = WorkerExit::Fatal("broken pipe".to_string());
        assert_eq!(
            WorkerHealth::from(&exit),
            WorkerHealth::Failed("broken pipe".to_string())
        );
        assert!(!exit.is_orderly());
        assert!(WorkerExit::Cancelled.is_orderly());
    }

    #[test]
    fn test_all_running_requires_every_worker() {
        let board = HealthBoard::new();
        board.record(WorkerKind::Outbound, WorkerHealth::Running);
        board.record(WorkerKind::Inbound, WorkerHealth::Running);
        assert!(!board.all_running());

        board.record(WorkerKind::Poller, WorkerHealth::Running);
        assert!(board.all_running());

        board.record(
            WorkerKind::Inbound,
            WorkerHealth::from(&WorkerExit::EndOfStream),
        );
        assert!(!board.all_running());
        assert_eq!(board.snapshot()[1].0, WorkerKind::Inbound);
    }
}
