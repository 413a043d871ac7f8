//! Memory domain types
//!
//! Framebuffer usage and ECC error counters as reported by the management
//! library.

use crate::smi::units::humanize_bytes;
use crate::telemetry::{percent, used_percent};

use serde::Serialize;

/// Framebuffer memory usage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Memory {
    pub uuid: String,

    pub total_bytes: u64,
    pub total_humanized: String,

    pub used_bytes: u64,
    pub used_humanized: String,

    pub free_bytes: u64,
    pub free_humanized: String,

    #[serde(serialize_with = "percent")]
    pub used_percent: Option<f64>,
}

impl Memory {
    pub fn new(uuid: impl Into<String>, total: u64, used: u64, free: u64) -> Self {
        Self {
            uuid: uuid.into(),
            total_bytes: total,
            total_humanized: humanize_bytes(total),
            used_bytes: used,
            used_humanized: humanize_bytes(used),
            free_bytes: free,
            free_humanized: humanize_bytes(free),
            used_percent: used_percent(used as f64, total as f64),
        }
    }
}

/// Corrected and uncorrected totals for one counter kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EccCounts {
    pub corrected: u64,
    pub uncorrected: u64,
}

impl EccCounts {
    pub fn has_uncorrected(&self) -> bool {
        self.uncorrected > 0
    }
}

/// ECC error totals.
///
/// Volatile counters reset at driver reload; aggregate counters persist
/// across the device's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EccErrors {
    pub uuid: String,

    /// False when the device has no ECC memory or ECC is disabled
    pub supported: bool,

    pub aggregate_total: EccCounts,
    pub volatile_total: EccCounts,
}

impl EccErrors {
    pub fn unsupported(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Default::default()
        }
    }
}
