//! Configuration handling for the telemetry node.
//!
//! Values come from the YAML config file, then environment variables, then
//! command-line flags, each layer overriding the previous one.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Prefix for every published topic
    pub topic_prefix: String,
    /// Broker connection
    pub broker: BrokerConfig,
    /// Duty-cycle timing
    pub timing: TimingConfig,
    /// Baseline storage
    pub storage: StorageConfig,
    /// Sensor wiring
    pub sensors: SensorConfig,
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Keepalive in seconds, 0 disables it
    pub keepalive: u16,
    /// Optional user name
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// Connect timeout (seconds)
    pub connect_timeout: u64,
    /// Per-operation I/O timeout (seconds)
    pub io_timeout: u64,
}

/// Duty-cycle timing, all in seconds unless noted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Radio association timeout
    pub link_timeout: u64,
    /// Settle sleep after setup
    pub settle: u64,
    /// Sleep between cycles
    pub cycle: u64,
    /// Park before a fatal reset (milliseconds)
    pub fatal_park_ms: u64,
    /// Fatal low-power reset
    pub fatal_sleep: u64,
    /// Gas baseline save interval
    pub baseline_interval: u64,
    /// CAQI averaging window
    pub caqi_window: u64,
    /// Particulate fan run time before a reading
    pub particulate_settle: u64,
}

/// Baseline storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `file`
    pub mode: String,
    /// Directory for file storage
    pub data_dir: PathBuf,
}

/// Sensor wiring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SensorConfig {
    /// Serial device of the particulate sensor; simulated when absent
    pub pms_device: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            client_id: "box01".to_string(),
            topic_prefix: "box01".to_string(),
            broker: BrokerConfig::default(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
            sensors: SensorConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keepalive: 60,
            username: None,
            password: None,
            connect_timeout: 10,
            io_timeout: 5,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            link_timeout: 30,
            settle: 30,
            cycle: 300,
            fatal_park_ms: 50,
            fatal_sleep: 60,
            baseline_interval: 3600,
            caqi_window: 3600,
            particulate_settle: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: "file".to_string(),
            data_dir: PathBuf::from("./airnode-data"),
        }
    }
}

impl TimingConfig {
    /// Radio association timeout
    pub fn link_timeout(&self) -> Duration {
        Duration::from_secs(self.link_timeout)
    }

    /// Settle sleep after setup
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle)
    }

    /// Sleep between cycles
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle)
    }

    /// Park before a fatal reset
    pub fn fatal_park(&self) -> Duration {
        Duration::from_millis(self.fatal_park_ms)
    }

    /// Fatal low-power reset
    pub fn fatal_sleep(&self) -> Duration {
        Duration::from_secs(self.fatal_sleep)
    }

    /// Gas baseline save interval
    pub fn baseline_interval(&self) -> Duration {
        Duration::from_secs(self.baseline_interval)
    }

    /// CAQI averaging window
    pub fn caqi_window(&self) -> Duration {
        Duration::from_secs(self.caqi_window)
    }

    /// Particulate fan run time
    pub fn particulate_settle(&self) -> Duration {
        Duration::from_secs(self.particulate_settle)
    }
}

impl NodeConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<NodeConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?}, using defaults: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        info!(
            "Final node configuration: client_id={}, broker={}:{}, cycle={}s, storage={}",
            config.client_id,
            config.broker.host,
            config.broker.port,
            config.timing.cycle,
            config.storage.mode
        );
        Ok(config)
    }

    /// Apply `AIRNODE_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("AIRNODE_BROKER_HOST") {
            info!("Broker host overridden by environment: {}", host);
            self.broker.host = host;
        }

        if let Some(port) = lookup("AIRNODE_BROKER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    info!("Broker port overridden by environment: {}", port);
                    self.broker.port = port;
                }
                Err(_) => warn!("Ignoring invalid AIRNODE_BROKER_PORT={}", port),
            }
        }

        if let Some(client_id) = lookup("AIRNODE_CLIENT_ID") {
            info!("Client ID overridden by environment: {}", client_id);
            self.client_id = client_id;
        }

        if let Some(username) = lookup("AIRNODE_USERNAME") {
            self.broker.username = Some(username);
        }

        if let Some(password) = lookup("AIRNODE_PASSWORD") {
            self.broker.password = Some(password);
        }

        if let Some(prefix) = lookup("AIRNODE_TOPIC_PREFIX") {
            info!("Topic prefix overridden by environment: {}", prefix);
            self.topic_prefix = prefix;
        }

        if let Some(dir) = lookup("AIRNODE_DATA_DIR") {
            info!("Data directory overridden by environment: {}", dir);
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            bail!("client_id must not be empty");
        }
        if self.broker.host.is_empty() {
            bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            bail!("broker.port must not be 0");
        }
        if self.broker.username.is_some() != self.broker.password.is_some() {
            bail!("broker.username and broker.password must be set together");
        }
        if !matches!(self.storage.mode.as_str(), "memory" | "file") {
            bail!(
                "Invalid storage mode: {}. Use 'memory' or 'file'",
                self.storage.mode
            );
        }
        if self.timing.caqi_window == 0 {
            bail!("timing.caqi_window must be positive");
        }
        Ok(())
    }
}

/// Split `host[:port]`
pub fn parse_broker(value: &str) -> Result<(String, Option<u16>)> {
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("invalid broker port in {:?}", value))?;
            Ok((host.to_string(), Some(port)))
        }
        Some(_) => bail!("missing broker host in {:?}", value),
        None if value.is_empty() => bail!("empty broker address"),
        None => Ok((value.to_string(), None)),
    }
}
