use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::control::event_log::DEFAULT_HISTORY_CAPACITY;
use crate::memory::plan::DEFAULT_PAGE_SIZE;
use crate::memory::PtrWidth;
use crate::MAX_BLOCK_SIZE;

/// Settings for attaching a module to a block processor.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// voices = 8
/// block_len = 256
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames per block.
    pub block_len: usize,
    /// Requested voices; 0 hosts the module monophonically.
    pub voices: usize,
    /// Bargraphs are read back every this many rendered blocks.
    pub bargraph_interval: u32,
    pub page_size: usize,
    /// Pointer-table word size in bytes (4 or 8).
    pub pointer_width: usize,
    /// Control messages the processor can have pending.
    pub queue_capacity: usize,
    /// Bargraph readbacks the control side can have pending.
    pub readback_capacity: usize,
    pub event_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_len: 128,
            voices: 0,
            bargraph_interval: 5,
            page_size: DEFAULT_PAGE_SIZE,
            pointer_width: 4,
            queue_capacity: 1024,
            readback_capacity: 256,
            event_log_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Errors that can occur when loading or validating a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read
    Io(String),
    /// The document is not valid TOML or has mistyped keys
    Parse(String),
    /// A setting is outside its supported range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "could not read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "malformed config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn with_voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_block_len(mut self, block_len: usize) -> Self {
        self.block_len = block_len;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_bargraph_interval(mut self, interval: u32) -> Self {
        self.bargraph_interval = interval;
        self
    }

    pub fn ptr_width(&self) -> Result<PtrWidth, ConfigError> {
        PtrWidth::from_bytes(self.pointer_width).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "pointer_width must be 4 or 8, got {}",
                self.pointer_width
            ))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive");
        }
        if self.block_len == 0 || self.block_len > MAX_BLOCK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "block_len must be in 1..={}, got {}",
                MAX_BLOCK_SIZE, self.block_len
            )));
        }
        if self.bargraph_interval == 0 {
            return invalid("bargraph_interval must be at least 1");
        }
        if self.page_size == 0 {
            return invalid("page_size must be positive");
        }
        if self.queue_capacity == 0 || self.readback_capacity == 0 {
            return invalid("queue capacities must be positive");
        }
        self.ptr_width()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.block_len, 128);
        assert_eq!(config.bargraph_interval, 5);
        assert_eq!(config.page_size, 65_536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("voices = 8\nblock_len = 256\n").unwrap();
        assert_eq!(config.voices, 8);
        assert_eq!(config.block_len, 256);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.ptr_width(), Ok(PtrWidth::Four));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("block_len = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("pointer_width = 2"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("voices = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "sample_rate = 44100\nbargraph_interval = 2\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.bargraph_interval, 2);

        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
