//! Simulator configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use emmcprg_core::{ChannelKind, EngineConfig};
use serde::{Deserialize, Serialize};

/// Configuration for the target simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Address the host tool connects to.
    pub listen: String,
    /// Directory holding the area images.
    pub image_dir: PathBuf,
    /// Channel behaviour to emulate.
    pub channel: ChannelKind,
    /// Size of a newly created user area, in sectors.
    pub user_sectors: u32,
    /// Size of each newly created boot area, in sectors.
    pub boot_sectors: u32,
    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7878".to_string(),
            image_dir: PathBuf::from("images"),
            channel: ChannelKind::Serial,
            // 64 MiB user area, 4 MiB boot areas
            user_sectors: 0x2_0000,
            boot_sectors: 0x2000,
            engine: EngineConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}
