// Configuration management for the peerchat CLI
//
// Cross-platform config stored in:
// - Linux: ~/.config/peerchat/config.json
// - macOS: ~/Library/Application Support/peerchat/config.json
// - Windows: %APPDATA%\peerchat\config.json

use anyhow::{Context, Result};
use peerchat_core::host::HostConfig;
use peerchat_core::overlay::OverlayConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Multiaddrs dialed at startup
    pub bootstrap_nodes: Vec<String>,

    /// TCP listen port, 0 picks a random one
    pub listen_port: u16,

    /// LAN discovery via mDNS
    pub enable_mdns: bool,

    /// Storage path for identity and archive
    pub storage_path: Option<String>,

    /// Topic joined on start
    pub default_topic: String,

    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub heartbeat_interval_secs: u64,
    pub health_check_interval_secs: u64,
    /// Topic peers wanted before publishing without a wait
    pub min_topic_peers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap_nodes: vec![],
            listen_port: 0,
            enable_mdns: true,
            storage_path: None,
            default_topic: "peerchat-lobby".to_string(),
            overlay: OverlaySettings::default(),
        }
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        let overlay = OverlayConfig::default();
        Self {
            heartbeat_interval_secs: overlay.heartbeat_interval.as_secs(),
            health_check_interval_secs: overlay.health_check_interval.as_secs(),
            min_topic_peers: overlay.min_topic_peers,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("peerchat");
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        Ok(config_dir)
    }

    /// Data directory: `storage_path` if set, otherwise the platform default
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = match &self.storage_path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_local_dir()
                .context("Failed to determine data directory")?
                .join("peerchat"),
        };
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn add_bootstrap_node(&mut self, node: String) -> Result<()> {
        node.parse::<libp2p::Multiaddr>()
            .with_context(|| format!("Invalid multiaddr: {}", node))?;
        if !self.bootstrap_nodes.contains(&node) {
            self.bootstrap_nodes.push(node);
        }
        Ok(())
    }

    pub fn remove_bootstrap_node(&mut self, node: &str) {
        self.bootstrap_nodes.retain(|n| n != node);
    }

    /// Set a config value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "listen_port" => self.listen_port = value.parse().context("Invalid port number")?,
            "enable_mdns" => self.enable_mdns = value.parse().context("Invalid boolean value")?,
            "storage_path" => {
                self.storage_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "default_topic" => {
                anyhow::ensure!(!value.is_empty(), "Topic cannot be empty");
                self.default_topic = value.to_string();
            }
            "heartbeat_interval" => {
                self.overlay.heartbeat_interval_secs = parse_secs(value)?;
            }
            "health_check_interval" => {
                self.overlay.health_check_interval_secs = parse_secs(value)?;
            }
            "min_topic_peers" => {
                self.overlay.min_topic_peers = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "listen_port" => Some(self.listen_port.to_string()),
            "enable_mdns" => Some(self.enable_mdns.to_string()),
            "storage_path" => self.storage_path.clone(),
            "default_topic" => Some(self.default_topic.clone()),
            "heartbeat_interval" => Some(self.overlay.heartbeat_interval_secs.to_string()),
            "health_check_interval" => Some(self.overlay.health_check_interval_secs.to_string()),
            "min_topic_peers" => Some(self.overlay.min_topic_peers.to_string()),
            _ => None,
        }
    }

    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("listen_port".to_string(), self.listen_port.to_string()),
            ("enable_mdns".to_string(), self.enable_mdns.to_string()),
            (
                "storage_path".to_string(),
                self.storage_path.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            ("default_topic".to_string(), self.default_topic.clone()),
            (
                "heartbeat_interval".to_string(),
                format!("{}s", self.overlay.heartbeat_interval_secs),
            ),
            (
                "health_check_interval".to_string(),
                format!("{}s", self.overlay.health_check_interval_secs),
            ),
            ("min_topic_peers".to_string(), self.overlay.min_topic_peers.to_string()),
            ("bootstrap_nodes".to_string(), self.bootstrap_nodes.len().to_string()),
        ]
    }

    /// Host settings derived from this config
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            overlay: OverlayConfig {
                heartbeat_interval: Duration::from_secs(self.overlay.heartbeat_interval_secs),
                health_check_interval: Duration::from_secs(self.overlay.health_check_interval_secs),
                min_topic_peers: self.overlay.min_topic_peers,
                ..Default::default()
            },
            maintenance: true,
        }
    }

    /// Parsed bootstrap addresses; unparsable entries are skipped with a warning
    pub fn bootstrap_addrs(&self) -> Vec<libp2p::Multiaddr> {
        self.bootstrap_nodes
            .iter()
            .filter_map(|addr| match addr.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!("Ignoring bootstrap node {}: {}", addr, e);
                    None
                }
            })
            .collect()
    }
}

fn parse_secs(value: &str) -> Result<u64> {
    let secs: u64 = value.trim_end_matches('s').parse().context("Invalid number of seconds")?;
    anyhow::ensure!(secs > 0, "Interval must be at least one second");
    Ok(secs)
}
