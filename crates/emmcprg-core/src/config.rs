//! Engine configuration.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::transport::ChannelProfile;

/// Configuration for a download engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Override the channel's default inbound CRC checking.
    pub crc_check: Option<bool>,
    /// Require a partition table before open multi-image. When false the
    /// session starts as if one had been received.
    pub require_partition_table: bool,
    /// Poll the channel for input while transmitting replies.
    pub poll_during_transmit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crc_check: None,
            require_partition_table: true,
            poll_during_transmit: true,
        }
    }
}

impl EngineConfig {
    /// Effective CRC checking for a channel.
    pub fn crc_enabled(&self, profile: &ChannelProfile) -> bool {
        self.crc_check.unwrap_or(profile.crc_check)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_default_follows_channel() {
        let config = EngineConfig::default();
        assert!(config.crc_enabled(&ChannelProfile::serial()));
        assert!(!config.crc_enabled(&ChannelProfile::bulk()));

        let forced = EngineConfig {
            crc_check: Some(true),
            ..Default::default()
        };
        assert!(forced.crc_enabled(&ChannelProfile::bulk()));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("crc_check = false").unwrap();
        assert_eq!(config.crc_check, Some(false));
        assert!(config.require_partition_table);
        assert!(config.poll_during_transmit);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "emmcprg-config-{}.toml",
            std::process::id()
        ));
        let config = EngineConfig {
            crc_check: Some(true),
            require_partition_table: false,
            poll_during_transmit: false,
        };
        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
