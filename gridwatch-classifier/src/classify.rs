//! Fixed-threshold anomaly classification

use crate::models::Anomaly;

/// Electricity readings strictly above this are a spike.
pub const ELECTRICITY_SPIKE_THRESHOLD: f64 = 20.0;

/// Water readings strictly above this are a leak.
pub const WATER_LEAK_THRESHOLD: f64 = 250.0;

/// Label a reading.
///
/// An electricity spike wins over a water leak when both hold. Thresholds
/// are strict, and NaN never exceeds them.
pub fn classify(electricity: f64, water: f64) -> Anomaly {
    if electricity > ELECTRICITY_SPIKE_THRESHOLD {
        Anomaly::ElectricitySpike
    } else if water > WATER_LEAK_THRESHOLD {
        Anomaly::WaterLeakage
    } else {
        Anomaly::Normal
    }
}
