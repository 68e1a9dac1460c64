//! GridWatch daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod config;
pub mod pipeline;
pub mod simulator;

pub use config::DaemonConfig;
pub use pipeline::{Shutdown, ShutdownTrigger};
