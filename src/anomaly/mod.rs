//! Hardware anomaly scans over decoded tool output
//!
//! Anomalies are plain diagnostic strings with the device id embedded. Every
//! scan returns `None` when it finds nothing so callers can branch on
//! presence alone.

use crate::smi::command::UNKNOWN_ERROR;
use crate::smi::document::{DeviceRecord, Document, EccErrors, CLOCK_EVENT_ACTIVE};

/// Marker the summary table prints in a failing cell
pub const SUMMARY_ERROR_MARKER: &str = "ERR!";

fn non_empty(found: Vec<String>) -> Option<Vec<String>> {
    if found.is_empty() {
        None
    } else {
        Some(found)
    }
}

impl DeviceRecord {
    /// Fields reading "Unknown Error", the addressing mode and fan speed included
    pub fn find_errors(&self) -> Option<Vec<String>> {
        let mut found = Vec::new();

        if let Some(temp) = &self.temperature {
            let fields = [
                ("Current", &temp.current),
                ("Limit", &temp.limit),
                ("ShutdownLimit", &temp.shutdown_limit),
                ("SlowdownLimit", &temp.slowdown_limit),
                ("MaxOperatingLimit", &temp.max_operating_limit),
                ("Target", &temp.target),
                ("MemoryCurrent", &temp.memory_current),
                ("MemoryMaxOperatingLimit", &temp.memory_max_operating_limit),
            ];
            found.extend(
                fields
                    .iter()
                    .filter(|(_, value)| value.contains(UNKNOWN_ERROR))
                    .map(|(name, _)| format!("{}: Temperature.{} Unknown Error", self.id, name)),
            );
        }

        if let Some(err) = self.addressing_mode_error() {
            found.push(err);
        }

        if self.fan_speed.contains(UNKNOWN_ERROR) {
            found.push(format!("{}: FanSpeed Unknown Error", self.id));
        }

        non_empty(found)
    }

    /// An unknown addressing mode tends to accompany a GPU memory page fault
    /// (Xid 31), so it is reported on its own as well.
    pub fn addressing_mode_error(&self) -> Option<String> {
        if self.addressing_mode.contains(UNKNOWN_ERROR) {
            Some(format!("{}: AddressingMode {}", self.id, self.addressing_mode))
        } else {
            None
        }
    }

    /// Active hardware slowdown sub-reasons. Both are ignored unless the
    /// top-level HW Slowdown flag is active.
    pub fn find_hw_slowdown_errors(&self) -> Option<Vec<String>> {
        let reasons = self.clock_event_reasons.as_ref()?;
        if reasons.hw_slowdown != CLOCK_EVENT_ACTIVE {
            return None;
        }

        let mut found = Vec::new();
        if reasons.hw_thermal_slowdown == CLOCK_EVENT_ACTIVE {
            found.push(format!(
                "{}: ClockEventReasons.HWSlowdown.ThermalSlowdown {}",
                self.id, CLOCK_EVENT_ACTIVE
            ));
        }
        if reasons.hw_power_brake_slowdown == CLOCK_EVENT_ACTIVE {
            found.push(format!(
                "{}: ClockEventReasons.HWSlowdown.PowerBrakeSlowdown {}",
                self.id, CLOCK_EVENT_ACTIVE
            ));
        }
        non_empty(found)
    }
}

impl EccErrors {
    /// Non-zero volatile uncorrectable counters
    pub fn find_volatile_uncorrectable_errors(&self) -> Option<Vec<String>> {
        let volatile = self.volatile.as_ref()?;
        let counters = [
            ("DRAMUncorrectable", &volatile.dram_uncorrectable),
            ("SRAMUncorrectable", &volatile.sram_uncorrectable),
            ("SRAMUncorrectableParity", &volatile.sram_uncorrectable_parity),
            ("SRAMUncorrectableSECDED", &volatile.sram_uncorrectable_secded),
        ];

        non_empty(
            counters
                .iter()
                .filter(|(_, value)| !value.is_empty() && value.as_str() != "0")
                .map(|(name, value)| format!("GPU {}: Volatile {}: {}", self.id, name, value))
                .collect(),
        )
    }
}

/// Lines of the summary table carrying the error marker, each paired with
/// the line above it for context.
pub fn find_summary_errors(summary: &str) -> Option<Vec<String>> {
    let lines: Vec<&str> = summary.split('\n').collect();
    let found = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(SUMMARY_ERROR_MARKER))
        .map(|(i, line)| match i {
            0 => line.to_string(),
            _ => format!("{}\n{}", lines[i - 1], line),
        })
        .collect();
    non_empty(found)
}

impl Document {
    /// Per-device errors, then summary errors (or the summary failure), then
    /// a declared-versus-decoded device count mismatch.
    pub fn find_gpu_errors(&self) -> Option<Vec<String>> {
        let mut found: Vec<String> = self
            .gpus
            .iter()
            .filter_map(DeviceRecord::find_errors)
            .flatten()
            .collect();

        match &self.summary_failure {
            Some(failure) => found.push(failure.clone()),
            None => found.extend(find_summary_errors(&self.summary).unwrap_or_default()),
        }

        if !self.device_count_matches() {
            found.push(format!(
                "AttachedGPUs {} != GPUs {}",
                self.attached_gpus,
                self.gpus.len()
            ));
        }

        if !found.is_empty() {
            log::debug!("found {} gpu error(s)", found.len());
        }
        non_empty(found)
    }

    /// Hardware slowdown anomalies across all devices
    pub fn find_hw_slowdown_errors(&self) -> Option<Vec<String>> {
        non_empty(
            self.gpus
                .iter()
                .filter_map(DeviceRecord::find_hw_slowdown_errors)
                .flatten()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smi::document::{ClockEventReasons, EccVolatile, TemperatureReadings};

    const ID: &str = "GPU 00000000:53:00.0";

    fn healthy() -> DeviceRecord {
        DeviceRecord {
            id: ID.to_string(),
            addressing_mode: String::new(),
            fan_speed: "N/A".to_string(),
            temperature: Some(TemperatureReadings {
                id: ID.to_string(),
                current: "36 C".to_string(),
                limit: "50 C".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn slowdown(top: &str, thermal: &str, brake: &str) -> DeviceRecord {
        DeviceRecord {
            id: ID.to_string(),
            clock_event_reasons: Some(ClockEventReasons {
                hw_slowdown: top.to_string(),
                hw_thermal_slowdown: thermal.to_string(),
                hw_power_brake_slowdown: brake.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_device_has_no_errors() {
        assert_eq!(healthy().find_errors(), None);
    }

    #[test]
    fn test_unknown_error_fields_reported_in_order() {
        let mut gpu = healthy();
        if let Some(temp) = gpu.temperature.as_mut() {
            temp.current = "Unknown Error".to_string();
            temp.memory_current = "Unknown Error".to_string();
        }
        gpu.fan_speed = "Unknown Error".to_string();
        gpu.addressing_mode = "Unknown Error".to_string();

        let errs = gpu.find_errors().unwrap();
        assert_eq!(
            errs,
            vec![
                format!("{}: Temperature.Current Unknown Error", ID),
                format!("{}: Temperature.MemoryCurrent Unknown Error", ID),
                format!("{}: AddressingMode Unknown Error", ID),
                format!("{}: FanSpeed Unknown Error", ID),
            ]
        );
    }

    #[test]
    fn test_addressing_mode_check_is_independent() {
        let mut gpu = healthy();
        assert_eq!(gpu.addressing_mode_error(), None);
        gpu.addressing_mode = "Unknown Error".to_string();
        assert_eq!(
            gpu.addressing_mode_error(),
            Some(format!("{}: AddressingMode Unknown Error", ID))
        );
    }

    #[test]
    fn test_hw_slowdown_short_circuit() {
        assert_eq!(
            slowdown("Not Active", "Active", "Active").find_hw_slowdown_errors(),
            None
        );
    }

    #[test]
    fn test_hw_slowdown_sub_flags() {
        let errs = slowdown("Active", "Active", "Not Active")
            .find_hw_slowdown_errors()
            .unwrap();
        assert_eq!(
            errs,
            vec![format!("{}: ClockEventReasons.HWSlowdown.ThermalSlowdown Active", ID)]
        );

        let errs = slowdown("Active", "Active", "Active")
            .find_hw_slowdown_errors()
            .unwrap();
        assert_eq!(errs.len(), 2);

        assert_eq!(
            slowdown("Active", "Not Active", "Not Active").find_hw_slowdown_errors(),
            None
        );
    }

    #[test]
    fn test_summary_errors_with_context() {
        let summary = "| 1  NVIDIA H100   On |\n| ERR!  75C  P0 |\n| 2  NVIDIA H100   On |";
        let errs = find_summary_errors(summary).unwrap();
        assert_eq!(errs, vec!["| 1  NVIDIA H100   On |\n| ERR!  75C  P0 |"]);

        let errs = find_summary_errors("ERR! first line\nok").unwrap();
        assert_eq!(errs, vec!["ERR! first line"]);

        assert_eq!(find_summary_errors("all good\n"), None);
        assert_eq!(find_summary_errors(""), None);
    }

    #[test]
    fn test_ecc_volatile_scan() {
        let mut ecc = EccErrors {
            id: ID.to_string(),
            volatile: Some(EccVolatile {
                dram_uncorrectable: "0".to_string(),
                sram_uncorrectable: "0".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(ecc.find_volatile_uncorrectable_errors(), None);

        if let Some(v) = ecc.volatile.as_mut() {
            v.dram_uncorrectable = "1".to_string();
            v.sram_uncorrectable_secded = "2".to_string();
        }
        let errs = ecc.find_volatile_uncorrectable_errors().unwrap();
        assert_eq!(
            errs,
            vec![
                format!("GPU {}: Volatile DRAMUncorrectable: 1", ID),
                format!("GPU {}: Volatile SRAMUncorrectableSECDED: 2", ID),
            ]
        );
    }

    #[test]
    fn test_ecc_scan_without_volatile_section() {
        assert_eq!(EccErrors::default().find_volatile_uncorrectable_errors(), None);
    }

    #[test]
    fn test_document_scan_order() {
        let mut gpu = healthy();
        gpu.fan_speed = "Unknown Error".to_string();
        let doc = Document {
            attached_gpus: 2,
            gpus: vec![gpu],
            summary: "| 0 H100 |\n| ERR! |".to_string(),
            ..Default::default()
        };

        let errs = doc.find_gpu_errors().unwrap();
        assert_eq!(
            errs,
            vec![
                format!("{}: FanSpeed Unknown Error", ID),
                "| 0 H100 |\n| ERR! |".to_string(),
                "AttachedGPUs 2 != GPUs 1".to_string(),
            ]
        );
    }

    #[test]
    fn test_summary_failure_replaces_summary_scan() {
        let doc = Document {
            attached_gpus: 1,
            gpus: vec![healthy()],
            summary: "| ERR! |".to_string(),
            summary_failure: Some("Unable to determine the device handle: Unknown Error".to_string()),
            ..Default::default()
        };

        let errs = doc.find_gpu_errors().unwrap();
        assert_eq!(
            errs,
            vec!["Unable to determine the device handle: Unknown Error".to_string()]
        );
    }

    #[test]
    fn test_clean_document_returns_none() {
        let doc = Document {
            attached_gpus: 1,
            gpus: vec![healthy()],
            summary: "| 0  NVIDIA H100 |".to_string(),
            ..Default::default()
        };
        assert_eq!(doc.find_gpu_errors(), None);
        assert_eq!(doc.find_hw_slowdown_errors(), None);
    }
}
