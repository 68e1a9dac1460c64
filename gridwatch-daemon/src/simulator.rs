//! Sensor feed simulator
//!
//! Stands in for the field hardware: appends a random reading to the input
//! log at a fixed cadence, occasionally injecting a spike or a leak.

use std::future::Future;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use gridwatch_classifier::SensorReading;
use gridwatch_log::EventLogWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::SimulatorConfig;

const NORMAL_ELECTRICITY: Range<f64> = 5.0..12.0;
const NORMAL_WATER: Range<f64> = 50.0..180.0;
const SPIKE_ELECTRICITY: Range<f64> = 21.0..35.0;
const LEAK_WATER: Range<f64> = 251.0..500.0;

/// Random reading generator
pub struct SensorSimulator<R: Rng = StdRng> {
    rng: R,
    anomaly_probability: f64,
}

impl SensorSimulator<StdRng> {
    pub fn new(anomaly_probability: f64) -> Self {
        Self::with_rng(StdRng::from_entropy(), anomaly_probability)
    }
}

impl<R: Rng> SensorSimulator<R> {
    pub fn with_rng(rng: R, anomaly_probability: f64) -> Self {
        Self {
            rng,
            anomaly_probability: anomaly_probability.clamp(0.0, 1.0),
        }
    }

    /// Next reading, timestamped now.
    ///
    /// Spike and leak are rolled independently, so both can occur together.
    pub fn next_reading(&mut self) -> SensorReading {
        let mut electricity = self.rng.gen_range(NORMAL_ELECTRICITY);
        let mut water = self.rng.gen_range(NORMAL_WATER);

        if self.rng.gen_bool(self.anomaly_probability) {
            electricity = self.rng.gen_range(SPIKE_ELECTRICITY);
        }
        if self.rng.gen_bool(self.anomaly_probability) {
            water = self.rng.gen_range(LEAK_WATER);
        }

        SensorReading::new(current_timestamp(), round2(electricity), round2(water))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn current_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Append readings to `input_path` every `config.interval_ms` until
/// `shutdown` resolves or `limit` readings have been written.
///
/// Returns the number of readings written.
pub async fn run_simulator<F>(
    input_path: &Path,
    config: &SimulatorConfig,
    limit: Option<u64>,
    shutdown: F,
) -> Result<u64>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut writer = EventLogWriter::open(input_path)
        .await
        .with_context(|| format!("Failed to open input log {}", input_path.display()))?;
    let mut simulator = SensorSimulator::new(config.anomaly_probability);
    let interval = Duration::from_millis(config.interval_ms);

    info!("Sensor simulator started. Writing to {}", input_path.display());

    let mut written = 0u64;
    while limit.map_or(true, |max| written < max) {
        let reading = simulator.next_reading();
        writer
            .append(&reading)
            .await
            .context("Failed to append sensor reading")?;
        written += 1;
        debug!(
            electricity = reading.electricity,
            water = reading.water,
            "Sent reading"
        );

        if limit.is_some_and(|max| written >= max) {
            break;
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(written, "Sensor simulator stopped");
    Ok(written)
}
