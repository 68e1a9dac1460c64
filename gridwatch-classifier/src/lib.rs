//! Sensor reading classification for GridWatch
//!
//! - [`classify`] maps an `(electricity, water)` pair to an [`Anomaly`]
//!   label using fixed, strict thresholds. An electricity spike takes
//!   precedence over a water leak.
//! - [`SensorReading`] / [`ClassifiedEvent`] are the JSON records of the
//!   input log and the event log.
//! - [`Enricher`] follows the input log and appends classified events to the
//!   event log.

pub mod classify;
pub mod enricher;
pub mod models;

// Re-exports
pub use classify::{classify, ELECTRICITY_SPIKE_THRESHOLD, WATER_LEAK_THRESHOLD};
pub use enricher::{EnrichStats, Enricher, EnricherConfig};
pub use models::{Anomaly, ClassifiedEvent, SensorReading};
