//! Lifecycle guard
//!
//! A single atomic phase decides which caller wins a transition. Losers observe the phase
//! they raced against and return without touching session resources.

use meshtun_core::SessionState;
use std::sync::atomic::{AtomicU8, Ordering};

/// Internal session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Starting,
            2 => Phase::Running,
            3 => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }
}

/// Compare-and-set guard over [`Phase`]
#[derive(Debug)]
pub struct Lifecycle {
    phase: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Stopped as u8),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Only the fully running phase counts as started
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn state(&self) -> SessionState {
        if self.is_running() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    /// Move `from` -> `to`; on failure returns the phase that was observed instead
    pub fn transition(&self, from: Phase, to: Phase) -> Result<(), Phase> {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Phase::from_u8)
    }

    pub fn try_begin_start(&self) -> Result<(), Phase> {
        self.transition(Phase::Stopped, Phase::Starting)
    }

    pub fn finish_start(&self) -> Result<(), Phase> {
        self.transition(Phase::Starting, Phase::Running)
    }

    /// Starting -> Stopped after a failed start
    pub fn abort_start(&self) -> Result<(), Phase> {
        self.transition(Phase::Starting, Phase::Stopped)
    }

    pub fn try_begin_stop(&self) -> Result<(), Phase> {
        self.transition(Phase::Running, Phase::Stopping)
    }

    pub fn finish_stop(&self) -> Result<(), Phase> {
        self.transition(Phase::Stopping, Phase::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), SessionState::Stopped);

        lifecycle.try_begin_start().unwrap();
        assert_eq!(lifecycle.state(), SessionState::Stopped);
        lifecycle.finish_start().unwrap();
        assert!(lifecycle.is_running());

        lifecycle.try_begin_stop().unwrap();
        assert!(!lifecycle.is_running());
        lifecycle.finish_stop().unwrap();
        assert_eq!(lifecycle.phase(), Phase::Stopped);
    }

    #[test]
    fn test_second_start_loses() {
        let lifecycle = Lifecycle::new();
        lifecycle.try_begin_start().unwrap();
        assert_eq!(lifecycle.try_begin_start(), Err(Phase::Starting));

        lifecycle.finish_start().unwrap();
        assert_eq!(lifecycle.try_begin_start(), Err(Phase::Running));
    }

    #[test]
    fn test_stop_from_stopped_loses() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.try_begin_stop(), Err(Phase::Stopped));
    }

    #[test]
    fn test_abort_start_returns_to_stopped() {
        let lifecycle = Lifecycle::new();
        lifecycle.try_begin_start().unwrap();
        lifecycle.abort_start().unwrap();
        assert_eq!(lifecycle.phase(), Phase::Stopped);
    }
}
