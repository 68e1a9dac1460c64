//! Data models for sensor readings and classified events

use serde::{Deserialize, Serialize};

use crate::classify::classify;

/// Anomaly label attached to every classified reading.
///
/// Serialized as the human-readable label shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anomaly {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Electricity Spike Detected")]
    ElectricitySpike,
    #[serde(rename = "Water Leakage Detected")]
    WaterLeakage,
}

impl Anomaly {
    pub fn as_str(&self) -> &'static str {
        match self {
            Anomaly::Normal => "Normal",
            Anomaly::ElectricitySpike => "Electricity Spike Detected",
            Anomaly::WaterLeakage => "Water Leakage Detected",
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Anomaly::Normal)
    }
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw sample from the sensor feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// ISO-8601, assigned by the producer and passed through untouched
    pub timestamp: String,
    pub electricity: f64,
    pub water: f64,
}

impl SensorReading {
    pub fn new(timestamp: impl Into<String>, electricity: f64, water: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            electricity,
            water,
        }
    }

    /// Attach the anomaly label for this reading.
    pub fn classify(self) -> ClassifiedEvent {
        ClassifiedEvent::from_reading(self)
    }
}

/// A reading plus its label; the unit of record in the event log.
///
/// Unknown fields are ignored on deserialization, so lines carrying extra
/// bookkeeping columns still validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub timestamp: String,
    pub electricity: f64,
    pub water: f64,
    pub anomaly: Anomaly,
}

impl ClassifiedEvent {
    pub fn from_reading(reading: SensorReading) -> Self {
        let anomaly = classify(reading.electricity, reading.water);
        Self {
            timestamp: reading.timestamp,
            electricity: reading.electricity,
            water: reading.water,
            anomaly,
        }
    }
}
