//! nvhealth - GPU health telemetry library
//!
//! This library decodes the vendor command-line tool's verbose output into a
//! typed document, normalizes its unit-suffixed readings, scans it for
//! hardware anomalies and monitors NVML fault events.
//!
//! # Modules
//!
//! - [`smi`]: Running the tool and decoding its output
//! - [`telemetry`]: Normalized temperature, power and memory readings
//! - [`anomaly`]: Hardware anomaly scans
//! - [`monitor`]: Live NVML device monitor and fault events
//! - [`nvml`]: NVML abstraction layer
//! - [`domain`]: Per-device metric records
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`error`]: Error types

pub mod anomaly;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod nvml;
pub mod smi;
pub mod telemetry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, Result};
