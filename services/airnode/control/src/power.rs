//! Low-power states.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Default settle time after setup
pub const DEFAULT_SETTLE_SLEEP: Duration = Duration::from_secs(30);

/// Default sleep between run cycles
pub const DEFAULT_CYCLE_SLEEP: Duration = Duration::from_secs(300);

/// Default park before a fatal reset
pub const DEFAULT_FATAL_PARK: Duration = Duration::from_millis(50);

/// Default length of the fatal low-power reset
pub const DEFAULT_FATAL_SLEEP: Duration = Duration::from_secs(60);

/// Device power control
#[async_trait]
pub trait PowerControl: Send {
    /// Sleep with RAM retained; execution resumes where it left off
    async fn light_sleep(&mut self, duration: Duration);

    /// Low-power reset; the controller restarts from boot afterwards
    async fn deep_sleep(&mut self, duration: Duration);
}

/// Host power control: both sleeps are timed waits
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPower;

#[async_trait]
impl PowerControl for HostPower {
    async fn light_sleep(&mut self, duration: Duration) {
        debug!("Light sleep for {:?}", duration);
        tokio::time::sleep(duration).await;
    }

    async fn deep_sleep(&mut self, duration: Duration) {
        info!("Deep sleep for {:?}", duration);
        tokio::time::sleep(duration).await;
    }
}
