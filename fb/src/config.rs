//! fifobell configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel;
use crate::trigger::TriggerConfig;
use crate::worker::FanoutPolicy;

/// Main fifobell configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Number of worker threads
    pub workers: usize,

    /// Delay between draining a trigger and broadcasting it, in milliseconds
    #[serde(rename = "processing-delay-ms")]
    pub processing_delay_ms: u64,

    /// Which workers do work for one broadcast
    pub fanout: FanoutPolicy,

    /// Trigger channel configuration
    pub channel: ChannelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            workers: 2,
            processing_delay_ms: 3000,
            fanout: FanoutPolicy::default(),
            channel: ChannelConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(eyre::eyre!("workers must be at least 1"));
        }
        if self.channel.prefix.contains('/') {
            return Err(eyre::eyre!(
                "channel prefix must not contain '/': {}",
                self.channel.prefix
            ));
        }
        Ok(())
    }

    /// Config files tried in order when no explicit path is given
    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".fifobell.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("fifobell").join("fifobell.yml"));
        }
        paths
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable file from
    /// `search_paths` wins; unreadable ones are skipped with a warning.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for path in Self::search_paths().iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Skipping config {}: {:#}", path.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Walks the same chain as [`load`](Self::load); errors are swallowed
    /// and reported by the full load later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::search_paths(),
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::debug!(path = %path.display(), "Config::load_from_file: loaded");
        Ok(config)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    /// Trigger loop settings derived from this config
    pub fn trigger_config(&self, max_triggers: Option<u64>) -> TriggerConfig {
        TriggerConfig {
            channel_dir: self.channel.dir.clone(),
            prefix: self.channel.prefix.clone(),
            processing_delay: self.processing_delay(),
            announce_file: self.channel.announce_file.clone(),
            max_triggers,
        }
    }
}

/// Trigger channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Parent directory for the per-channel private temp dirs
    pub dir: PathBuf,

    /// Prefix of the per-channel temp dir names
    pub prefix: String,

    /// File the listening channel's path is published to (none disables)
    #[serde(rename = "announce-file")]
    pub announce_file: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            prefix: channel::DEFAULT_PREFIX.to_string(),
            announce_file: Some(channel::default_announce_path()),
        }
    }
}
