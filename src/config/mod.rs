//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::error::ConfigError;
use crate::nvml::EventTypeMask;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Command-line tool invocation
    pub smi: SmiConfig,
    /// Device monitor settings
    pub monitor: MonitorConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
}

/// Command-line tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmiConfig {
    /// Binary name or path, resolved on `PATH`
    pub binary: String,
    /// Arguments for the verbose query mode
    pub query_args: Vec<String>,
    /// Arguments for the summary mode
    pub summary_args: Vec<String>,
}

impl Default for SmiConfig {
    fn default() -> Self {
        Self {
            binary: crate::smi::command::DEFAULT_BINARY.to_string(),
            query_args: vec!["--query".to_string()],
            summary_args: Vec::new(),
        }
    }
}

/// Device monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Event wait timeout in milliseconds
    pub wait_timeout_ms: u64,
    /// Capacity of the outbound fault event queue
    pub event_queue_capacity: usize,
    /// Event classes to register for
    pub event_mask: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5000,
            event_queue_capacity: 100,
            event_mask: vec![
                "xid_critical_error".to_string(),
                "double_bit_ecc_error".to_string(),
                "single_bit_ecc_error".to_string(),
            ],
        }
    }
}

impl MonitorConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Combine the configured event class names into one mask
    pub fn interest_mask(&self) -> Result<EventTypeMask, ConfigError> {
        self.event_mask
            .iter()
            .try_fold(EventTypeMask::empty(), |mask, name| {
                EventTypeMask::from_name(name)
                    .map(|bit| mask | bit)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "monitor.event_mask".to_string(),
                        message: format!("unknown event class '{}'", name),
                    })
            })
    }

    /// Reject values the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "monitor.wait_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "monitor.event_queue_capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        self.interest_mask().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.general.verbose);
        assert_eq!(config.smi.binary, "nvidia-smi");
        assert_eq!(config.smi.query_args, vec!["--query"]);
        assert_eq!(config.monitor.wait_timeout_ms, 5000);
        assert_eq!(config.monitor.event_queue_capacity, 100);
    }

    #[test]
    fn test_default_interest_mask() {
        let mask = MonitorConfig::default().interest_mask().unwrap();
        assert_eq!(mask, EventTypeMask::DEFAULT_INTEREST);
    }

    #[test]
    fn test_unknown_event_class_rejected() {
        let config = MonitorConfig {
            event_mask: vec!["xid_critical_error".to_string(), "fan_speed".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fan_speed"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = MonitorConfig {
            event_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
