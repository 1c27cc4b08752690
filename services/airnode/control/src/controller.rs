//! Duty-cycle controller.
//!
//! ```text
//!  Boot ──► Setup ──► Run ──► Sleep ─┐
//!    ▲        │        ▲ │           │
//!    │        │        │ └───────────┘ (repeat)
//!    │        ▼        │
//!    └──── FatalFail ◄─┘ (any failure in Boot, Setup or Run)
//! ```
//!
//! Each [`Controller::step`] performs exactly one transition. A failure is
//! logged, the device parks briefly, takes a long low-power reset and starts
//! again from boot with fresh cycle state.

use crate::acquisition::Acquisition;
use crate::baseline::{persist_baseline, restore_baseline};
use crate::cycle::CycleState;
use crate::error::ControlError;
use crate::power::{
    PowerControl, DEFAULT_CYCLE_SLEEP, DEFAULT_FATAL_PARK, DEFAULT_FATAL_SLEEP,
    DEFAULT_SETTLE_SLEEP,
};
use airnode_session::{associate_with_timeout, Link, ProtocolClient, Transport, DEFAULT_LINK_POLL};
use airnode_storage::ScalarStore;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default bound on radio association
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between baseline saves
pub const DEFAULT_BASELINE_INTERVAL: Duration = Duration::from_secs(3600);

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Power-on: bring up the radio link
    Boot,
    /// One-time sensor, baseline and broker setup
    Setup,
    /// One acquisition and publish cycle
    Run,
    /// Low-power wait between cycles
    Sleep,
    /// Log, park, low-power reset
    FatalFail,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Boot => "boot",
            Phase::Setup => "setup",
            Phase::Run => "run",
            Phase::Sleep => "sleep",
            Phase::FatalFail => "fatal-fail",
        };
        f.write_str(name)
    }
}

/// Controller timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Bound on radio association
    pub link_timeout: Duration,
    /// Association status poll interval
    pub link_poll: Duration,
    /// Light sleep after setup so sensors settle
    pub settle_sleep: Duration,
    /// Light sleep between cycles
    pub cycle_sleep: Duration,
    /// Park before the fatal reset
    pub fatal_park: Duration,
    /// Length of the fatal low-power reset
    pub fatal_sleep: Duration,
    /// Interval between gas baseline saves
    pub baseline_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            link_timeout: DEFAULT_LINK_TIMEOUT,
            link_poll: DEFAULT_LINK_POLL,
            settle_sleep: DEFAULT_SETTLE_SLEEP,
            cycle_sleep: DEFAULT_CYCLE_SLEEP,
            fatal_park: DEFAULT_FATAL_PARK,
            fatal_sleep: DEFAULT_FATAL_SLEEP,
            baseline_interval: DEFAULT_BASELINE_INTERVAL,
        }
    }
}

/// Counters kept across cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Run cycles that reached Sleep
    pub cycles_completed: u64,
    /// Fatal resets taken
    pub fatal_failures: u64,
    /// Messages written to the broker
    pub messages_published: u64,
    /// Cycles where the particulate sensor gave no reading
    pub missed_particulate_reads: u64,
    /// Baseline saves that failed
    pub baseline_save_failures: u64,
}

/// Duty-cycle state machine over its collaborators
pub struct Controller<T, L, P>
where
    T: Transport,
    L: Link,
    P: PowerControl,
{
    config: ControllerConfig,
    client: ProtocolClient<T>,
    link: L,
    power: P,
    acquisition: Acquisition,
    store: Box<dyn ScalarStore>,
    state: Option<CycleState>,
    phase: Phase,
    failure: Option<(Phase, ControlError)>,
    stats: ControllerStats,
}

impl<T, L, P> Controller<T, L, P>
where
    T: Transport,
    L: Link,
    P: PowerControl,
{
    /// Controller in [`Phase::Boot`]
    pub fn new(
        config: ControllerConfig,
        client: ProtocolClient<T>,
        link: L,
        power: P,
        acquisition: Acquisition,
        store: Box<dyn ScalarStore>,
    ) -> Self {
        Self {
            config,
            client,
            link,
            power,
            acquisition,
            store,
            state: None,
            phase: Phase::Boot,
            failure: None,
            stats: ControllerStats::default(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Counters so far
    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Cycle state, present between Setup and the next fatal reset
    pub fn cycle_state(&self) -> Option<&CycleState> {
        self.state.as_ref()
    }

    /// Protocol client
    pub fn client(&self) -> &ProtocolClient<T> {
        &self.client
    }

    /// Power controller
    pub fn power(&self) -> &P {
        &self.power
    }

    /// Perform one transition and return the new phase
    pub async fn step(&mut self) -> Phase {
        let current = self.phase;
        let outcome = match current {
            Phase::Boot => self.boot().await,
            Phase::Setup => self.setup().await,
            Phase::Run => self.run_cycle().await,
            Phase::Sleep => {
                info!("Going to sleep for {:?}", self.config.cycle_sleep);
                self.power.light_sleep(self.config.cycle_sleep).await;
                Ok(Phase::Run)
            }
            Phase::FatalFail => {
                self.fatal_reset().await;
                Ok(Phase::Boot)
            }
        };

        let next = match outcome {
            Ok(next) => next,
            Err(e) => {
                error!("{} failed: {}", current, e);
                self.failure = Some((current, e));
                Phase::FatalFail
            }
        };
        debug!("Phase {} -> {}", current, next);
        self.phase = next;
        next
    }

    async fn boot(&mut self) -> Result<Phase, ControlError> {
        info!("Running setup");
        associate_with_timeout(&mut self.link, self.config.link_timeout, self.config.link_poll)
            .await?;
        Ok(Phase::Setup)
    }

    async fn setup(&mut self) -> Result<Phase, ControlError> {
        self.acquisition.init_sensors().await?;

        restore_baseline(self.acquisition.gas_mut(), self.store.as_ref()).await;
        self.state = Some(CycleState::new(Instant::now()));

        self.client.connect(true).await?;
        info!("Setup complete");

        self.power.light_sleep(self.config.settle_sleep).await;
        Ok(Phase::Run)
    }

    async fn run_cycle(&mut self) -> Result<Phase, ControlError> {
        info!("Waking up");
        associate_with_timeout(&mut self.link, self.config.link_timeout, self.config.link_poll)
            .await?;
        self.client.connect(false).await?;

        info!("Running main loop");
        let state = self
            .state
            .take()
            .unwrap_or_else(|| CycleState::new(Instant::now()));
        let (mut state, report) = self.acquisition.run(state, &mut self.client).await?;
        self.stats.messages_published += report.published;
        if report.particulates.is_none() {
            self.stats.missed_particulate_reads += 1;
        }

        let now = Instant::now();
        if state.baseline_due(now, self.config.baseline_interval) {
            let saved = persist_baseline(
                self.acquisition.gas_mut(),
                self.store.as_ref(),
                &report.climate,
            )
            .await;
            if let Err(e) = saved {
                warn!("Impossible to save gas baselines: {}", e);
                self.stats.baseline_save_failures += 1;
            }
            state.mark_baseline_saved(now);
        }
        self.state = Some(state);

        self.client.disconnect().await;
        self.stats.cycles_completed += 1;
        info!(
            "Cycle {} complete: {} messages this cycle, {} total, {} fatal resets",
            self.stats.cycles_completed,
            report.published,
            self.stats.messages_published,
            self.stats.fatal_failures
        );
        Ok(Phase::Sleep)
    }

    async fn fatal_reset(&mut self) {
        if let Some((phase, e)) = self.failure.take() {
            warn!("Resetting after failure during {}: {}", phase, e);
        }
        self.stats.fatal_failures += 1;

        tokio::time::sleep(self.config.fatal_park).await;
        self.client.disconnect().await;
        self.state = None;
        self.power.deep_sleep(self.config.fatal_sleep).await;
        info!("Restarting after low-power reset");
    }

    /// Step until `max_cycles` run cycles completed or `shutdown` resolves.
    ///
    /// The broker connection is released before returning.
    pub async fn run<S>(&mut self, max_cycles: Option<u64>, shutdown: S) -> ControllerStats
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            if let Some(max) = max_cycles {
                if self.stats.cycles_completed >= max {
                    info!("Completed {} cycles", max);
                    break;
                }
            }
            let stopped = tokio::select! {
                _ = &mut shutdown => true,
                _ = self.step() => false,
            };
            if stopped {
                info!("Shutdown requested during {}", self.phase);
                break;
            }
        }
        self.client.disconnect().await;
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SensorSuite;
    use crate::topics::Topics;
    use airnode_sensors::sim::{SimClimate, SimGas, SimParticulates, SimPressure};
    use airnode_session::{ClientIdentity, LinkStatus, TransportError};
    use airnode_storage::{MemoryStore, CO2EQ_BASELINE, TVOC_BASELINE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    /// Accepts every handshake unless told to refuse the next `refusals` connects
    #[derive(Default)]
    struct FakeBroker {
        refusals: AtomicUsize,
        connects: AtomicUsize,
        streams: Mutex<Vec<DuplexStream>>,
    }

    #[async_trait]
    impl Transport for FakeBroker {
        type Stream = DuplexStream;

        async fn connect(
            &self,
            host: &str,
            port: u16,
            _timeout: Duration,
        ) -> Result<DuplexStream, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(TransportError::Connect {
                    addr: format!("{}:{}", host, port),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                });
            }
            let (client, mut broker) = duplex(64 * 1024);
            broker.write_all(&[0x20, 0x02, 0x00, 0x00]).await?;
            self.streams.lock().unwrap().push(broker);
            Ok(client)
        }
    }

    struct StaticLink(LinkStatus);

    #[async_trait]
    impl Link for StaticLink {
        async fn status(&mut self) -> LinkStatus {
            self.0
        }

        async fn power_on(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn begin_association(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPower {
        light: Vec<Duration>,
        deep: Vec<Duration>,
    }

    #[async_trait]
    impl PowerControl for RecordingPower {
        async fn light_sleep(&mut self, duration: Duration) {
            self.light.push(duration);
            tokio::time::sleep(duration).await;
        }

        async fn deep_sleep(&mut self, duration: Duration) {
            self.deep.push(duration);
            tokio::time::sleep(duration).await;
        }
    }

    fn suite() -> SensorSuite {
        SensorSuite {
            climate: Box::new(SimClimate::default()),
            pressure: Box::new(SimPressure::default()),
            gas: Box::new(SimGas::new()),
            particulates: Box::new(SimParticulates::new()),
        }
    }

    fn controller_with(
        config: ControllerConfig,
        broker: FakeBroker,
        link: LinkStatus,
        sensors: SensorSuite,
        store: MemoryStore,
    ) -> Controller<FakeBroker, StaticLink, RecordingPower> {
        let client = ProtocolClient::new(ClientIdentity::new("box01", "broker", 1883), broker);
        Controller::new(
            config,
            client,
            StaticLink(link),
            RecordingPower::default(),
            Acquisition::new(sensors, Topics::default()),
            Box::new(store),
        )
    }

    fn controller(broker: FakeBroker) -> Controller<FakeBroker, StaticLink, RecordingPower> {
        controller_with(
            ControllerConfig::default(),
            broker,
            LinkStatus::Up,
            suite(),
            MemoryStore::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_cycles() {
        let mut controller = controller(FakeBroker::default());
        let stats = controller.run(Some(2), std::future::pending()).await;

        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.fatal_failures, 0);
        assert_eq!(stats.messages_published, 16);
        // Clean connect at setup, then one per cycle
        assert_eq!(controller.client().transport().connects.load(Ordering::SeqCst), 3);
        assert_eq!(
            controller.power().light,
            vec![DEFAULT_SETTLE_SLEEP, DEFAULT_CYCLE_SLEEP]
        );
        assert!(!controller.client().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_connect_failure_is_fatal_once() {
        let broker = FakeBroker {
            refusals: AtomicUsize::new(1),
            ..Default::default()
        };
        let mut controller = controller(broker);

        assert_eq!(controller.step().await, Phase::Setup);
        assert_eq!(controller.step().await, Phase::FatalFail);
        assert_eq!(controller.client().transport().connects.load(Ordering::SeqCst), 1);
        assert!(controller.power().deep.is_empty());

        assert_eq!(controller.step().await, Phase::Boot);
        assert_eq!(controller.power().deep, vec![DEFAULT_FATAL_SLEEP]);
        assert_eq!(controller.stats().fatal_failures, 1);
        assert!(controller.cycle_state().is_none());
        assert_eq!(controller.client().transport().connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_fatal_reset() {
        let broker = FakeBroker {
            refusals: AtomicUsize::new(1),
            ..Default::default()
        };
        let mut controller = controller(broker);

        let mut phases = Vec::new();
        for _ in 0..7 {
            phases.push(controller.step().await);
        }
        assert_eq!(
            phases,
            vec![
                Phase::Setup,
                Phase::FatalFail,
                Phase::Boot,
                Phase::Setup,
                Phase::Run,
                Phase::Sleep,
                Phase::Run,
            ]
        );
        assert_eq!(controller.stats().cycles_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_climate_calibration_failure_skips_connect() {
        let mut sensors = suite();
        sensors.climate = Box::new(SimClimate::default().refusing_calibration());
        let mut controller = controller_with(
            ControllerConfig::default(),
            FakeBroker::default(),
            LinkStatus::Up,
            sensors,
            MemoryStore::new(),
        );

        controller.step().await;
        assert_eq!(controller.step().await, Phase::FatalFail);
        assert_eq!(controller.client().transport().connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_init_refusal_not_fatal() {
        let mut sensors = suite();
        sensors.gas = Box::new(SimGas::new().refusing_init());
        let mut controller = controller_with(
            ControllerConfig::default(),
            FakeBroker::default(),
            LinkStatus::Up,
            sensors,
            MemoryStore::new(),
        );

        controller.step().await;
        assert_eq!(controller.step().await, Phase::Run);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_timeout_at_boot() {
        let mut controller = controller_with(
            ControllerConfig::default(),
            FakeBroker::default(),
            LinkStatus::Down,
            suite(),
            MemoryStore::new(),
        );

        let start = Instant::now();
        assert_eq!(controller.step().await, Phase::FatalFail);
        assert!(start.elapsed() >= DEFAULT_LINK_TIMEOUT);
        assert_eq!(controller.client().transport().connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_saved_when_due() {
        let store = MemoryStore::new();
        let config = ControllerConfig {
            baseline_interval: Duration::from_secs(300),
            ..Default::default()
        };
        let mut controller = controller_with(
            config,
            FakeBroker::default(),
            LinkStatus::Up,
            suite(),
            store.clone(),
        );

        controller.run(Some(1), std::future::pending()).await;
        assert_eq!(store.load(CO2EQ_BASELINE).await.unwrap(), None);

        controller.run(Some(2), std::future::pending()).await;
        assert!(store.load(CO2EQ_BASELINE).await.unwrap().is_some());
        assert!(store.load(TVOC_BASELINE).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_run() {
        let mut controller = controller(FakeBroker::default());
        let stats = controller
            .run(None, tokio::time::sleep(Duration::from_secs(1000)))
            .await;

        // Cycles at 30 s, 330 s, 630 s and 930 s after boot
        assert_eq!(stats.cycles_completed, 4);
        assert!(!controller.client().is_connected());
    }
}
