//! Unified error types for nvhealth
//!
//! This module defines all error types used throughout the crate.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from NVML operations
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    /// Error from the device monitor
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Error from running or decoding the command-line tool
    #[error("nvidia-smi error: {0}")]
    Smi(#[from] SmiError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from unit-suffixed value parsing
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    /// JSON serialization of an output document failed
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization of an output document failed
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from NVML wrapper operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NvmlError {
    /// Failed to initialize NVML library
    #[error("Failed to initialize NVML: {0}")]
    InitializationFailed(String),

    /// NVML library not found
    #[error("NVML library not found. Is the NVIDIA driver installed?")]
    LibraryNotFound,

    /// Device not found at index
    #[error("GPU device not found at index {0}")]
    DeviceNotFound(u32),

    /// Operation not supported by this GPU
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Insufficient permissions
    #[error("Insufficient permissions: {0}. Try running with sudo.")]
    InsufficientPermissions(String),

    /// No event arrived before the wait deadline
    #[error("Timed out waiting for an event")]
    Timeout,

    /// A handle was used after it was released
    #[error("nvml not initialized")]
    NotInitialized,

    /// Unknown NVML error
    #[error("NVML error: {0}")]
    Unknown(String),

    /// GPU is lost (fallen off bus, etc.)
    #[error("GPU is lost or has become inaccessible")]
    GpuLost,

    /// Invalid argument passed to NVML
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<nvml_wrapper::error::NvmlError> for NvmlError {
    fn from(err: nvml_wrapper::error::NvmlError) -> Self {
        use nvml_wrapper::error::NvmlError as NE;
        match err {
            NE::NotSupported => {
                NvmlError::NotSupported("Operation not supported by this GPU".to_string())
            }
            NE::NoPermission => {
                NvmlError::InsufficientPermissions("Insufficient permissions".to_string())
            }
            NE::LibloadingError(_) | NE::LibraryNotFound => NvmlError::LibraryNotFound,
            NE::DriverNotLoaded => {
                NvmlError::InitializationFailed("NVIDIA driver not loaded".to_string())
            }
            NE::Timeout => NvmlError::Timeout,
            NE::Uninitialized => NvmlError::NotInitialized,
            NE::GpuLost => NvmlError::GpuLost,
            NE::InvalidArg => NvmlError::InvalidArgument("Invalid argument".to_string()),
            other => NvmlError::Unknown(other.to_string()),
        }
    }
}

/// Errors from parsing unit-suffixed tool values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    /// The tool reported "N/A": the value is absent, not malformed
    #[error("N/A")]
    NotAvailable,

    /// The value does not carry the expected unit suffix
    #[error("invalid {field}: {value} (expected {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The numeric part did not parse
    #[error("invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseFloatError),

    /// A byte-size string could not be parsed
    #[error("invalid byte size: {0:?}")]
    InvalidByteSize(String),
}

impl UnitError {
    /// True when the value was simply absent
    pub fn is_not_available(&self) -> bool {
        matches!(self, UnitError::NotAvailable)
    }
}

/// Errors from decoding the verbose tool output
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The rewritten text did not decode into the document schema
    #[error("failed to decode query output: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors from locating and running the command-line tool
#[derive(Error, Debug)]
pub enum SmiError {
    /// The tool binary is not on the search path
    #[error("{0} not found on PATH")]
    NotFound(String),

    /// The tool could not be spawned
    #[error("failed to run {binary}: {source}")]
    Io {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully
    #[error("{binary} exited with {status}: {stderr}")]
    CommandFailed {
        binary: String,
        status: String,
        stderr: String,
    },

    /// The verbose output could not be decoded at all
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl SmiError {
    /// True when the host simply has no tool installed
    pub fn is_not_found(&self) -> bool {
        matches!(self, SmiError::NotFound(_))
    }
}

/// Errors from device monitor lifecycle and queries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The monitor has been shut down (or never initialized)
    #[error("nvml not initialized")]
    NotInitialized,

    /// `start` was called on a running monitor
    #[error("monitor already started")]
    AlreadyStarted,

    /// A query was issued before `start`
    #[error("monitor not started")]
    NotStarted,

    /// The event receiver has already been handed out
    #[error("fault event receiver already taken")]
    EventStreamTaken,

    /// A device reported an empty UUID
    #[error("device uuid is empty")]
    EmptyUuid,

    /// Internal lock was poisoned by a panicking thread
    #[error("monitor state lock poisoned")]
    LockPoisoned,

    /// The background loop could not be spawned or joined
    #[error("event loop failure: {0}")]
    EventLoop(String),

    /// Underlying NVML call failed
    #[error(transparent)]
    Nvml(#[from] NvmlError),
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// A best-effort value paired with the first error hit while producing it.
///
/// Decode fallback and snapshot queries return whatever they managed to
/// collect; callers decide whether the partial data is actionable.
#[derive(Debug)]
pub struct Partial<T, E> {
    pub value: T,
    pub error: Option<E>,
}

impl<T, E> Partial<T, E> {
    /// A value produced without error
    pub fn complete(value: T) -> Self {
        Self { value, error: None }
    }

    /// A value salvaged alongside an error
    pub fn degraded(value: T, error: E) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Discard the partial value if anything went wrong
    pub fn into_result(self) -> std::result::Result<T, E> {
        match self.error {
            None => Ok(self.value),
            Some(e) => Err(e),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
