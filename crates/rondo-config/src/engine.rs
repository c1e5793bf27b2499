//! Engine-wide settings.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings fixed for the lifetime of a session's render graph.
///
/// ```toml
/// sample_rate = 48000
/// block_size = 512
/// output_channels = 2
/// input_channels = 2
/// midi_capacity = 512
/// deferred_drain_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session sample rate in Hz.
    pub sample_rate: u32,
    /// Maximum frames per render block.
    pub block_size: usize,
    /// Channels on the graph's main output bus.
    pub output_channels: u16,
    /// Channels on the graph's main input bus. Zero disables input.
    pub input_channels: u16,
    /// Events each node's MIDI buffer holds per block.
    pub midi_capacity: usize,
    /// Interval between deferred-queue drains on the maintenance thread.
    pub deferred_drain_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            output_channels: 2,
            input_channels: 2,
            midi_capacity: 512,
            deferred_drain_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Set the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sample rate as `f64`, the unit the graph works in.
    pub fn sample_rate_hz(&self) -> f64 {
        f64::from(self.sample_rate)
    }

    /// Check that the settings describe a renderable graph.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::invalid("sample_rate must be positive"));
        }
        if self.block_size == 0 {
            return Err(ConfigError::invalid("block_size must be positive"));
        }
        if self.output_channels == 0 {
            return Err(ConfigError::invalid("output_channels must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.output_channels, 2);
        assert_eq!(config.input_channels, 2);
        assert_eq!(config.midi_capacity, 512);
        assert_eq!(config.deferred_drain_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        assert!(EngineConfig::default().with_sample_rate(0).validate().is_err());
        assert!(EngineConfig::default().with_block_size(0).validate().is_err());
        let mono_less = EngineConfig {
            output_channels: 0,
            ..EngineConfig::default()
        };
        assert!(mono_less.validate().is_err());

        let no_input = EngineConfig {
            input_channels: 0,
            ..EngineConfig::default()
        };
        assert!(no_input.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("sample_rate = 44100").unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.sample_rate_hz(), 44100.0);
    }
}
