//! Manually advanced clock

use meshtun_core::{TimeSource, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// [`TimeSource`] that only moves when told to
///
/// Clones share the same underlying time, so a test can keep one handle and give the other
/// to the session.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.as_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let clock = ManualTimeSource::new(Timestamp::new(1_000));
        let handle = clock.clone();

        handle.advance(Duration::from_secs(2));
        assert_eq!(clock.now(), Timestamp::new(3_000));

        clock.set(Timestamp::new(10));
        assert_eq!(handle.now().as_millis(), 10);
    }
}
