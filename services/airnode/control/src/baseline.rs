//! Gas-sensor baseline maintenance.

use crate::error::ControlError;
use airnode_sensors::{absolute_humidity, Baseline, Climate, GasSensor};
use airnode_storage::{ScalarStore, CO2EQ_BASELINE, TVOC_BASELINE};
use tracing::{info, warn};

async fn load_word(store: &dyn ScalarStore, name: &'static str) -> Result<Option<u16>, ControlError> {
    match store.load(name).await? {
        Some(value) => u16::try_from(value)
            .map(Some)
            .map_err(|_| ControlError::BaselineRange { name, value }),
        None => Ok(None),
    }
}

/// Restore the persisted baseline into the gas sensor.
///
/// Missing, corrupt or rejected values leave the sensor on its factory
/// baseline. Returns the baseline applied, if any.
pub async fn restore_baseline(gas: &mut dyn GasSensor, store: &dyn ScalarStore) -> Option<Baseline> {
    let loaded = async {
        let eco2 = load_word(store, CO2EQ_BASELINE).await?;
        let tvoc = load_word(store, TVOC_BASELINE).await?;
        Ok::<_, ControlError>(eco2.zip(tvoc))
    }
    .await;

    let baseline = match loaded {
        Ok(Some((eco2, tvoc))) => Baseline { eco2, tvoc },
        Ok(None) => {
            warn!("No stored gas baselines, using factory state");
            return None;
        }
        Err(e) => {
            warn!("Impossible to read gas baselines: {}", e);
            return None;
        }
    };

    match gas.set_baseline(baseline).await {
        Ok(()) => {
            info!("Baselines loaded: eco2={:#06x} tvoc={:#06x}", baseline.eco2, baseline.tvoc);
            Some(baseline)
        }
        Err(e) => {
            warn!("{} rejected stored baseline: {}", gas.name(), e);
            None
        }
    }
}

/// Save the sensor's current baseline, then update its humidity compensation
/// from `climate`.
pub async fn persist_baseline(
    gas: &mut dyn GasSensor,
    store: &dyn ScalarStore,
    climate: &Climate,
) -> Result<Baseline, ControlError> {
    let baseline = gas.baseline().await?;
    store.save(CO2EQ_BASELINE, i64::from(baseline.eco2)).await?;
    store.save(TVOC_BASELINE, i64::from(baseline.tvoc)).await?;

    let ah = absolute_humidity(climate.temperature_c, climate.relative_humidity);
    gas.set_absolute_humidity(ah).await?;

    info!(
        "Baselines saved: eco2={:#06x} tvoc={:#06x}, humidity compensation {:.2} g/m3",
        baseline.eco2, baseline.tvoc, ah
    );
    Ok(baseline)
}
