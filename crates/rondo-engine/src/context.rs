//! Shared session services.

use std::sync::Arc;

use rondo_config::EngineConfig;
use rondo_core::{BusLayout, ChannelSet, DeferredQueue, Transport};
use rondo_source::{FormatRegistry, SourceManager, SourcePool};

use crate::error::Result;

/// The services a session's components share, constructed once and passed
/// explicitly.
///
/// Cloning is cheap: every service sits behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pool: Arc<SourcePool>,
    formats: Arc<FormatRegistry>,
    manager: Arc<SourceManager>,
    transport: Arc<Transport>,
    deferred: Arc<DeferredQueue>,
    config: EngineConfig,
}

impl SessionContext {
    /// Builds fresh services for `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(SourcePool::new());
        let formats = Arc::new(FormatRegistry::new());
        let manager = Arc::new(SourceManager::new(Arc::clone(&pool), Arc::clone(&formats)));
        manager.sample_rate_changed(config.sample_rate_hz(), config.block_size);
        Ok(Self {
            pool,
            formats,
            manager,
            transport: Arc::new(Transport::new(config.sample_rate_hz())),
            deferred: Arc::new(DeferredQueue::new()),
            config,
        })
    }

    /// Shared source pool.
    pub fn pool(&self) -> &Arc<SourcePool> {
        &self.pool
    }

    /// Codecs by file extension.
    pub fn formats(&self) -> &Arc<FormatRegistry> {
        &self.formats
    }

    /// Source manager bound to the pool.
    pub fn manager(&self) -> &Arc<SourceManager> {
        &self.manager
    }

    /// Shared transport.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Queue for teardown that must not happen on the render thread.
    pub fn deferred(&self) -> &Arc<DeferredQueue> {
        &self.deferred
    }

    /// Settings the context was built from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Device layout described by the config: one main input bus (none when
    /// `input_channels` is 0) and one main output bus.
    pub fn device_layout(&self) -> BusLayout {
        let inputs = match self.config.input_channels {
            0 => Vec::new(),
            n => vec![ChannelSet::from_count(usize::from(n))],
        };
        BusLayout::new(
            inputs,
            vec![ChannelSet::from_count(usize::from(self.config.output_channels))],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_follow_config() {
        let ctx = SessionContext::new(EngineConfig::default().with_sample_rate(44100)).unwrap();
        assert_eq!(ctx.manager().session_rate(), 44100.0);
        assert_eq!(ctx.transport().sample_rate(), 44100.0);
        assert!(Arc::ptr_eq(ctx.manager().pool(), ctx.pool()));
        assert_eq!(ctx.device_layout(), BusLayout::stereo());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::default().with_block_size(0);
        assert!(SessionContext::new(config).is_err());
    }

    #[test]
    fn test_output_only_layout() {
        let config = EngineConfig {
            input_channels: 0,
            ..EngineConfig::default()
        };
        let ctx = SessionContext::new(config).unwrap();
        assert!(ctx.device_layout().inputs.is_empty());
    }
}
