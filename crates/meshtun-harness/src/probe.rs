//! Observer-side helpers for asserting on status broadcasts

use meshtun_core::{ConnectivityState, StatusEvent, StatusReceiver};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;

const POLL_STEP: Duration = Duration::from_millis(2);

/// Synchronous wrapper around a status subscription
pub struct EventProbe {
    receiver: StatusReceiver,
}

impl EventProbe {
    pub fn new(receiver: StatusReceiver) -> Self {
        Self { receiver }
    }

    /// Next event, waiting at most `timeout`
    pub fn next_within(&mut self, timeout: Duration) -> Option<StatusEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(POLL_STEP);
                }
            }
        }
    }

    /// Skip events until one matches `predicate`
    pub fn wait_for<F>(&mut self, timeout: Duration, mut predicate: F) -> Option<StatusEvent>
    where
        F: FnMut(&StatusEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while let Some(event) = self.next_within(deadline.saturating_duration_since(Instant::now()))
        {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Wait for a specific coarse connectivity broadcast
    pub fn wait_for_connectivity(
        &mut self,
        state: ConnectivityState,
        timeout: Duration,
    ) -> bool {
        self.wait_for(timeout, |event| {
            matches!(event, StatusEvent::Connectivity { state: s } if *s == state)
        })
        .is_some()
    }

    /// Everything already queued
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }

    /// True if nothing arrives within `window`
    pub fn expect_quiet(&mut self, window: Duration) -> bool {
        self.next_within(window).is_none()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_STEP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtun_core::{StatusBroadcaster, StatusSnapshot};

    #[test]
    fn test_wait_for_skips_unmatched_events() {
        let broadcaster = StatusBroadcaster::new(8);
        let mut probe = EventProbe::new(broadcaster.subscribe());

        broadcaster.publish(StatusEvent::State(StatusSnapshot::stopped()));
        broadcaster.publish_connectivity(ConnectivityState::Disabled);

        assert!(probe.wait_for_connectivity(ConnectivityState::Disabled, Duration::from_millis(50)));
        assert!(probe.expect_quiet(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(10), || false));
        assert!(wait_until(Duration::from_millis(10), || true));
    }
}
