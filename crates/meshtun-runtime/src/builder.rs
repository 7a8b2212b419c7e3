//! Session Builder API
//!
//! Hosts assemble a [`TunnelSession`] from its collaborators. The engine factory and the
//! platform are required; clock, UI gate and broadcaster have defaults.

use crate::session::TunnelSession;
use meshtun_core::{
    EngineFactory, StatusBroadcaster, SystemTimeSource, TimeSource, TunnelConfig, TunnelError,
    TunnelPlatform, TunnelResult, UiInterest, UpdateGate,
};
use std::sync::Arc;
use tracing::info;

// ----------------------------------------------------------------------------
// Session Builder
// ----------------------------------------------------------------------------

/// Builder for a [`TunnelSession`]
pub struct SessionBuilder {
    config: TunnelConfig,
    engines: Option<Arc<dyn EngineFactory>>,
    platform: Option<Arc<dyn TunnelPlatform>>,
    clock: Arc<dyn TimeSource>,
    gate: Arc<dyn UpdateGate>,
    broadcaster: StatusBroadcaster,
}

impl SessionBuilder {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            engines: None,
            platform: None,
            clock: Arc::new(SystemTimeSource::new()),
            gate: Arc::new(UiInterest::new(false)),
            broadcaster: StatusBroadcaster::default(),
        }
    }

    /// Factory invoked once per start
    pub fn engine_factory(mut self, engines: Arc<dyn EngineFactory>) -> Self {
        self.engines = Some(engines);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn TunnelPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Clock used for the connectivity cadence
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Gate deciding whether detailed snapshots are published (default: never)
    pub fn update_gate(mut self, gate: Arc<dyn UpdateGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn broadcaster(mut self, broadcaster: StatusBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Validate the configuration and build a stopped session
    pub fn build(self) -> TunnelResult<TunnelSession> {
        self.config.validate()?;
        let engines = self
            .engines
            .ok_or_else(|| TunnelError::missing_dependency("engine factory"))?;
        let platform = self
            .platform
            .ok_or_else(|| TunnelError::missing_dependency("platform"))?;

        info!("Built tunnel session '{}'", self.config.session_name);
        Ok(TunnelSession::new(
            self.config,
            engines,
            platform,
            self.clock,
            self.gate,
            self.broadcaster,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtun_core::{ConfigError, SessionState};
    use meshtun_harness::{MemoryPlatform, MockEngineFactory};

    #[test]
    fn test_build_requires_engine_factory() {
        let result = SessionBuilder::new(TunnelConfig::testing())
            .platform(Arc::new(MemoryPlatform::new()))
            .build();

        assert!(matches!(
            result,
            Err(TunnelError::Config(ConfigError::MissingDependency {
                name: "engine factory"
            }))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = TunnelConfig::testing();
        config.timing.poll_interval_ms = 0;

        let result = SessionBuilder::new(config)
            .engine_factory(Arc::new(MockEngineFactory::new()))
            .platform(Arc::new(MemoryPlatform::new()))
            .build();
        assert!(matches!(result, Err(TunnelError::Config(ConfigError::Invalid { .. }))));
    }

    #[test]
    fn test_built_session_is_stopped() {
        let session = SessionBuilder::new(TunnelConfig::testing())
            .engine_factory(Arc::new(MockEngineFactory::new()))
            .platform(Arc::new(MemoryPlatform::new()))
            .build()
            .expect("Failed to build session");

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.health().is_empty());
    }
}
