//! Host Configuration Loader
//!
//! Parses the host's INI-style configuration file and provides
//! strongly-typed structs with sensible defaults, so the host runs against
//! the emulator out of the box.

use anyhow::{anyhow, Context, Result};
use configparser::ini::Ini;
use std::path::Path;

/// Represents the [device] section of the config.
#[derive(Debug, Clone)]
pub struct DeviceLinkConfig {
    /// Serial device path, or `unix:<path>` for the emulator socket.
    pub port: String,
    pub baud: u32,
}

/// Represents the [web] section of the config.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
}

/// Holds the entire parsed host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub device: DeviceLinkConfig,
    pub web: WebConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device: DeviceLinkConfig {
                port: "unix:/tmp/chroma-sim.sock".to_string(),
                baud: 115_200,
            },
            web: WebConfig { port: 8080 },
        }
    }
}

impl HostConfig {
    /// Loads and parses the configuration file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|e| anyhow!("failed to load configuration file {:?}: {}", path, e))?;

        let defaults = Self::default();

        let port = config
            .get("device", "port")
            .context("[device] port not found")?;
        let baud = config
            .getuint("device", "baud")
            .map_err(|e| anyhow!("[device] baud: {}", e))?
            .map_or(defaults.device.baud, |b| b as u32);
        let web_port = config
            .getuint("web", "port")
            .map_err(|e| anyhow!("[web] port: {}", e))?
            .map_or(defaults.web.port, |p| p as u16);

        Ok(Self {
            device: DeviceLinkConfig { port, baud },
            web: WebConfig { port: web_port },
        })
    }
}
