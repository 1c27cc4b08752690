//! Environmental telemetry node binary.
//!
//! Samples climate, pressure, gas and particulate sensors on a duty cycle and
//! publishes the readings to a broker, sleeping between cycles.

use airnode_control::{
    Acquisition, Controller, ControllerConfig, HostPower, SensorSuite, Topics,
};
use airnode_sensors::sim::{SimClimate, SimGas, SimParticulates, SimPressure};
use airnode_sensors::{Particulates, Pms7003, Sensor};
use airnode_session::{ClientIdentity, HostLink, ProtocolClient, TcpTransport, DEFAULT_LINK_POLL};
use airnode_storage::{open_store, StorageMode};
use airnode_wire::Credentials;
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

/// PMS7003 UART speed
const PMS_BAUD_RATE: u32 = 9600;

use config::{parse_broker, NodeConfig};
use logging::AirnodeLogFormatter;

/// Duty-cycled environmental telemetry node
#[derive(Parser, Debug)]
#[command(name = "airnode", version, about = "Duty-cycled environmental telemetry node")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "airnode.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Broker address, host or host:port
    #[arg(long)]
    broker: Option<String>,

    /// Stop after this many run cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Sleep between cycles, e.g. 5m
    #[arg(long)]
    cycle_interval: Option<humantime::Duration>,

    /// Storage mode: memory, file
    #[arg(long)]
    storage_mode: Option<String>,

    /// Data directory for file storage
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Serial device of the PMS7003 particulate sensor
    #[arg(long)]
    pms_device: Option<PathBuf>,
}

impl Args {
    /// Flags override file and environment
    fn apply_to(&self, config: &mut NodeConfig) -> anyhow::Result<()> {
        if let Some(broker) = &self.broker {
            let (host, port) = parse_broker(broker)?;
            config.broker.host = host;
            if let Some(port) = port {
                config.broker.port = port;
            }
        }
        if let Some(interval) = self.cycle_interval {
            config.timing.cycle = Duration::from(interval).as_secs();
        }
        if let Some(mode) = &self.storage_mode {
            config.storage.mode = mode.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if let Some(device) = &self.pms_device {
            config.sensors.pms_device = Some(device.clone());
        }
        config.validate()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("airnode={}", args.log_level).parse()?)
        .add_directive(format!("airnode_control={}", args.log_level).parse()?)
        .add_directive(format!("airnode_session={}", args.log_level).parse()?)
        .add_directive(format!("airnode_sensors={}", args.log_level).parse()?)
        .add_directive(format!("airnode_storage={}", args.log_level).parse()?)
        .add_directive(format!("airnode_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(AirnodeLogFormatter::new("airnode"))
        .init();

    component_info!("main", "Starting airnode v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NodeConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config)?;

    let storage_mode = match config.storage.mode.as_str() {
        "file" => StorageMode::File {
            data_dir: config.storage.data_dir.clone(),
        },
        _ => StorageMode::InMemory,
    };
    let store = open_store(storage_mode)
        .await
        .context("failed to open baseline storage")?;

    let particulates = particulate_sensor(&config).await?;
    let sensors = SensorSuite {
        climate: Box::new(SimClimate::default()),
        pressure: Box::new(SimPressure::default()),
        gas: Box::new(SimGas::new()),
        particulates,
    };
    let acquisition = Acquisition::new(sensors, Topics::new(&config.topic_prefix))
        .with_index_window(config.timing.caqi_window());

    let client = ProtocolClient::new(identity(&config), TcpTransport).with_timeouts(
        Duration::from_secs(config.broker.connect_timeout),
        Duration::from_secs(config.broker.io_timeout),
    );
    let link = HostLink::new(config.broker.host.clone(), config.broker.port);

    let controller_config = ControllerConfig {
        link_timeout: config.timing.link_timeout(),
        link_poll: DEFAULT_LINK_POLL,
        settle_sleep: config.timing.settle(),
        cycle_sleep: config.timing.cycle(),
        fatal_park: config.timing.fatal_park(),
        fatal_sleep: config.timing.fatal_sleep(),
        baseline_interval: config.timing.baseline_interval(),
    };
    info!(
        "Controller config: cycle={:?}, settle={:?}, link_timeout={:?}, baseline_interval={:?}",
        controller_config.cycle_sleep,
        controller_config.settle_sleep,
        controller_config.link_timeout,
        controller_config.baseline_interval
    );

    let mut controller = Controller::new(
        controller_config,
        client,
        link,
        HostPower,
        acquisition,
        store,
    );

    let stats = controller.run(args.cycles, shutdown_signal()).await;
    component_info!(
        "main",
        "Stopped after {} cycles: {} messages published, {} fatal resets, {} missed particulate reads",
        stats.cycles_completed,
        stats.messages_published,
        stats.fatal_failures,
        stats.missed_particulate_reads
    );
    Ok(())
}

fn identity(config: &NodeConfig) -> ClientIdentity {
    let mut identity = ClientIdentity::new(
        config.client_id.clone(),
        config.broker.host.clone(),
        config.broker.port,
    );
    identity.keepalive = config.broker.keepalive;
    identity.credentials = match (&config.broker.username, &config.broker.password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };
    identity
}

/// Real sensor on the configured serial device, simulated otherwise
async fn particulate_sensor(
    config: &NodeConfig,
) -> anyhow::Result<Box<dyn Sensor<Reading = Option<Particulates>>>> {
    match &config.sensors.pms_device {
        Some(device) => {
            let port = open_serial(device)?;
            info!("Particulate sensor on {}", device.display());
            Ok(Box::new(
                Pms7003::new(port).with_settle(config.timing.particulate_settle()),
            ))
        }
        None => {
            info!("No particulate device configured, using simulated sensor");
            Ok(Box::new(SimParticulates::new()))
        }
    }
}

/// Open the particulate sensor UART at 9600 8N1
fn open_serial(device: &Path) -> anyhow::Result<SerialStream> {
    tokio_serial::new(device.to_string_lossy(), PMS_BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .with_context(|| format!("failed to open particulate device {}", device.display()))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => component_warn!("main", "Interrupt received, shutting down"),
        Err(e) => {
            component_error!("main", "Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["airnode"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = NodeConfig::default();
        args(&[
            "--broker",
            "10.1.1.1:1885",
            "--cycle-interval",
            "2m",
            "--storage-mode",
            "memory",
            "--pms-device",
            "/dev/ttyAMA0",
        ])
        .apply_to(&mut config)
        .unwrap();

        assert_eq!(config.broker.host, "10.1.1.1");
        assert_eq!(config.broker.port, 1885);
        assert_eq!(config.timing.cycle, 120);
        assert_eq!(config.storage.mode, "memory");
        assert_eq!(config.sensors.pms_device, Some(PathBuf::from("/dev/ttyAMA0")));
    }

    #[test]
    fn test_bad_storage_mode_rejected() {
        let mut config = NodeConfig::default();
        assert!(args(&["--storage-mode", "redis"]).apply_to(&mut config).is_err());
    }

    #[test]
    fn test_identity_credentials() {
        let mut config = NodeConfig::default();
        assert!(identity(&config).credentials.is_none());

        config.broker.username = Some("node".to_string());
        config.broker.password = Some("pw".to_string());
        let identity = identity(&config);
        assert_eq!(identity.keepalive, 60);
        assert_eq!(identity.credentials.unwrap().username, "node");
    }

    #[tokio::test]
    async fn test_missing_serial_device() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_serial(&dir.path().join("ttyNONE")).is_err());
    }

    #[tokio::test]
    async fn test_regular_file_is_not_a_serial_device() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(open_serial(file.path()).is_err());
    }
}
