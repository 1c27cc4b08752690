//! Working state carried between run cycles.

use airnode_sensors::Particulates;
use std::time::Duration;
use tokio::time::Instant;

/// Particulate accumulators and maintenance timestamps.
///
/// Owned by the controller and handed to each acquisition cycle by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    pm2_5_sum: u64,
    pm10_sum: u64,
    samples: u32,
    index_started: Instant,
    baseline_saved: Instant,
}

impl CycleState {
    /// Fresh state; both timers start at `now`
    pub fn new(now: Instant) -> Self {
        Self {
            pm2_5_sum: 0,
            pm10_sum: 0,
            samples: 0,
            index_started: now,
            baseline_saved: now,
        }
    }

    /// Add one particulate sample to the rolling sums
    pub fn accumulate(&mut self, reading: &Particulates) {
        self.pm2_5_sum += u64::from(reading.pm2_5);
        self.pm10_sum += u64::from(reading.pm10_0);
        self.samples += 1;
    }

    /// Samples accumulated since the last index
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Whether the index window has elapsed
    pub fn index_due(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.index_started) >= window
    }

    /// Integer PM2.5 / PM10 averages, resetting the sums and the window.
    ///
    /// `None` when no sample was accumulated; the window still restarts.
    pub fn take_index_average(&mut self, now: Instant) -> Option<(u32, u32)> {
        let averages = (self.samples > 0).then(|| {
            let n = u64::from(self.samples);
            (
                u32::try_from(self.pm2_5_sum / n).unwrap_or(u32::MAX),
                u32::try_from(self.pm10_sum / n).unwrap_or(u32::MAX),
            )
        });
        self.pm2_5_sum = 0;
        self.pm10_sum = 0;
        self.samples = 0;
        self.index_started = now;
        averages
    }

    /// Whether the baseline persistence interval has elapsed
    pub fn baseline_due(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.baseline_saved) >= interval
    }

    /// Restart the baseline interval
    pub fn mark_baseline_saved(&mut self, now: Instant) {
        self.baseline_saved = now;
    }
}
