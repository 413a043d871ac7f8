//! Framebuffer memory normalization

use crate::error::UnitError;
use crate::smi::document::FbMemoryUsage;
use crate::smi::units::{humanize_bytes, parse_bytes};
use crate::telemetry::{percent, used_percent};

use serde::Serialize;

/// Parsed framebuffer usage, humanized strings re-rendered canonically
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMemory {
    pub id: String,

    pub total_bytes: u64,
    pub total_humanized: String,

    pub reserved_bytes: u64,
    pub reserved_humanized: String,

    pub used_bytes: u64,
    pub used_humanized: String,

    #[serde(serialize_with = "percent")]
    pub used_percent: Option<f64>,

    pub free_bytes: u64,
    pub free_humanized: String,
}

impl FbMemoryUsage {
    /// Parse the section. All four sizes are mandatory.
    pub fn normalize(&self) -> Result<NormalizedMemory, UnitError> {
        let total = parse_bytes(&self.total)?;
        let reserved = parse_bytes(&self.reserved)?;
        let used = parse_bytes(&self.used)?;
        let free = parse_bytes(&self.free)?;

        Ok(NormalizedMemory {
            id: self.id.clone(),
            total_bytes: total,
            total_humanized: humanize_bytes(total),
            reserved_bytes: reserved,
            reserved_humanized: humanize_bytes(reserved),
            used_bytes: used,
            used_humanized: humanize_bytes(used),
            used_percent: used_percent(used as f64, total as f64),
            free_bytes: free,
            free_humanized: humanize_bytes(free),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: &str, used: &str) -> FbMemoryUsage {
        FbMemoryUsage {
            id: "GPU 00000000:53:00.0".to_string(),
            total: total.to_string(),
            reserved: "551 MiB".to_string(),
            used: used.to_string(),
            free: "40268 MiB".to_string(),
        }
    }

    #[test]
    fn test_used_percent_half() {
        let mem = usage("80536 MiB", "40268 MiB").normalize().unwrap();
        assert_eq!(mem.total_bytes, 80536 * 1024 * 1024);
        assert_eq!(mem.used_bytes, 40268 * 1024 * 1024);

        let json = serde_json::to_value(&mem).unwrap();
        assert_eq!(json["used_percent"], "50.00");
        assert_eq!(json["total_bytes"], 84_448_116_736u64);
    }

    #[test]
    fn test_humanized_strings_are_canonical() {
        let mem = usage("80536 MiB", "40268 MiB").normalize().unwrap();
        assert_eq!(mem.total_humanized, humanize_bytes(mem.total_bytes));
        assert_eq!(
            parse_bytes(&mem.total_humanized).map(humanize_bytes).unwrap(),
            mem.total_humanized
        );
    }

    #[test]
    fn test_zero_total_reports_zero_percent() {
        let mem = usage("0 MiB", "0 MiB").normalize().unwrap();
        assert_eq!(mem.used_percent, None);
    }

    #[test]
    fn test_any_size_failure_aborts() {
        let mut raw = usage("80536 MiB", "40268 MiB");
        raw.reserved = "Unknown Error".to_string();
        assert!(matches!(
            raw.normalize().unwrap_err(),
            UnitError::InvalidByteSize(_)
        ));
    }
}
