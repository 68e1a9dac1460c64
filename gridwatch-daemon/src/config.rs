//! Configuration management

use anyhow::{Context, Result};
use gridwatch_broadcaster::{BroadcasterConfig, DEFAULT_SUBSCRIBER_BUFFER};
use gridwatch_classifier::EnricherConfig;
use gridwatch_log::TailStart;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP/websocket listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Log file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Raw sensor readings (written by the simulator, read by the enricher)
    pub input_path: PathBuf,

    /// Classified events (written by the enricher, tailed by the server)
    pub event_path: PathBuf,

    /// Where the server starts reading the event log: "beginning" or "end"
    pub start_from: TailStart,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            input_path: gridwatch_paths::get_input_log_path()
                .unwrap_or_else(|_| PathBuf::from("input.jsonl")),
            event_path: gridwatch_paths::get_event_log_path()
                .unwrap_or_else(|_| PathBuf::from("events.jsonl")),
            start_from: TailStart::Beginning,
        }
    }
}

/// Broadcast loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterSection {
    /// Delay between event log polls (milliseconds)
    pub poll_interval_ms: u64,

    /// Failed polls in a row before the server gives up
    pub max_consecutive_failures: u32,

    /// Per-subscriber queue depth; a subscriber this far behind is dropped
    pub subscriber_buffer: usize,

    /// Also wake on filesystem change notifications
    pub watch_filesystem: bool,
}

impl Default for BroadcasterSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_consecutive_failures: 20,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            watch_filesystem: false,
        }
    }
}

impl BroadcasterSection {
    pub fn to_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

/// Enrichment stage tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherSection {
    pub poll_interval_ms: u64,

    /// Where to start reading the input log: "beginning" or "end"
    pub start_from: TailStart,
}

impl Default for EnricherSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            start_from: TailStart::End,
        }
    }
}

impl EnricherSection {
    pub fn to_config(&self) -> EnricherConfig {
        EnricherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            start_from: self.start_from,
        }
    }
}

/// Sensor simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay between generated readings (milliseconds)
    pub interval_ms: u64,

    /// Independent chance of a spike, and of a leak, per reading
    pub anomaly_probability: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            anomaly_probability: 0.05,
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "gridwatch_broadcaster=debug"
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub server: ServerConfig,
    pub log: LogConfig,
    pub broadcaster: BroadcasterSection,
    pub enricher: EnricherSection,
    pub simulator: SimulatorConfig,
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        let config_path =
            gridwatch_paths::get_config_path().context("Failed to locate config directory")?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`; write defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            toml::from_str::<DaemonConfig>(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            let mut config = Self::default();
            config.config_path = path.to_path_buf();
            config.save().context("Failed to save default config")?;
            config
        };

        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        gridwatch_paths::ensure_parent_dir(&self.config_path)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.broadcaster.poll_interval_ms == 0 {
            anyhow::bail!("broadcaster.poll_interval_ms must be greater than 0");
        }
        if self.broadcaster.max_consecutive_failures == 0 {
            anyhow::bail!("broadcaster.max_consecutive_failures must be greater than 0");
        }
        if self.broadcaster.subscriber_buffer == 0 {
            anyhow::bail!("broadcaster.subscriber_buffer must be greater than 0");
        }
        if self.enricher.poll_interval_ms == 0 {
            anyhow::bail!("enricher.poll_interval_ms must be greater than 0");
        }
        if self.simulator.interval_ms == 0 {
            anyhow::bail!("simulator.interval_ms must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.simulator.anomaly_probability) {
            anyhow::bail!(
                "simulator.anomaly_probability must be within 0.0..=1.0, got {}",
                self.simulator.anomaly_probability
            );
        }
        Ok(())
    }
}
