//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{Config, ConfigFile};

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from a file
    pub fn with_file(mut self, path: Option<&str>) -> Self {
        let file_config = if let Some(path) = path {
            match ConfigFile::load(path) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    log::warn!("Failed to load config {}: {}", path, e);
                    None
                }
            }
        } else {
            ConfigFile::load_default()
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        self
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override the tool binary
    pub fn with_smi_binary(mut self, binary: Option<String>) -> Self {
        if let Some(b) = binary {
            self.config.smi.binary = b;
        }
        self
    }

    /// Override the event wait timeout
    pub fn with_wait_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        if let Some(t) = timeout_ms {
            self.config.monitor.wait_timeout_ms = t;
        }
        self
    }

    /// Override the event queue capacity
    pub fn with_event_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        if let Some(c) = capacity {
            self.config.monitor.event_queue_capacity = c;
        }
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build();
        assert!(!config.general.verbose);
        assert_eq!(config.smi.binary, "nvidia-smi");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_verbose(Some(true))
            .with_smi_binary(Some("/usr/local/bin/nvidia-smi".to_string()))
            .with_wait_timeout_ms(Some(250))
            .with_event_queue_capacity(None)
            .build();

        assert!(config.general.verbose);
        assert_eq!(config.smi.binary, "/usr/local/bin/nvidia-smi");
        assert_eq!(config.monitor.wait_timeout_ms, 250);
        assert_eq!(config.monitor.event_queue_capacity, 100);
    }

    #[test]
    fn test_missing_explicit_file_keeps_defaults() {
        let config = ConfigBuilder::new()
            .with_file(Some("/nonexistent/nvhealth.toml"))
            .build();
        assert_eq!(config.monitor.wait_timeout_ms, 5000);
    }
}
