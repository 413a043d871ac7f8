//! Output formatting utilities
//!
//! Provides table, JSON and YAML output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::error::AppError;
use crate::monitor::{FaultEvent, Snapshot};
use crate::smi::{humanize_bytes, DeviceRecord, Document};
use crate::telemetry::{NormalizedMemory, NormalizedPower, NormalizedTemperature};
use serde::Serialize;
use std::io::{self, Write};

/// Render `data` in the selected format
pub fn render<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> Result<String, AppError> {
    match format {
        OutputFormat::Table => Ok(data.to_table()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).map_err(AppError::from)
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(data).map_err(AppError::from)
        }
    }
}

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> Result<(), AppError> {
    let rendered = render(data, format)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", rendered.trim_end())?;
    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;
}

fn check_line(ok: bool, message: &str) -> String {
    if ok {
        format!("✓ {}\n", message)
    } else {
        format!("✗ {}\n", message)
    }
}

/// Normalized readings for one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTelemetry {
    pub id: String,
    pub product_name: String,
    pub temperature: Option<NormalizedTemperature>,
    pub power: Option<NormalizedPower>,
    pub memory: Option<NormalizedMemory>,
    /// Sections that failed to normalize
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<&DeviceRecord> for DeviceTelemetry {
    fn from(record: &DeviceRecord) -> Self {
        let mut errors = Vec::new();

        let temperature = record.temperature.as_ref().and_then(|t| {
            t.normalize()
                .map_err(|e| errors.push(format!("Temperature: {}", e)))
                .ok()
        });
        let power = record.power_readings.as_ref().and_then(|p| {
            p.normalize()
                .map_err(|e| errors.push(format!("GPU Power Readings: {}", e)))
                .ok()
        });
        let memory = record.fb_memory_usage.as_ref().and_then(|m| {
            m.normalize()
                .map_err(|e| errors.push(format!("FB Memory Usage: {}", e)))
                .ok()
        });

        Self {
            id: record.id.clone(),
            product_name: record.product_name.clone(),
            temperature,
            power,
            memory,
            errors,
        }
    }
}

/// Output of the query command
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub driver_version: String,
    pub cuda_version: String,
    pub attached_gpus: usize,
    pub devices: Vec<DeviceTelemetry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl QueryReport {
    pub fn from_document(doc: &Document, decode_error: Option<String>) -> Self {
        Self {
            driver_version: doc.driver_version.clone(),
            cuda_version: doc.cuda_version.clone(),
            attached_gpus: doc.attached_gpus,
            devices: doc.gpus.iter().map(DeviceTelemetry::from).collect(),
            decode_error,
        }
    }
}

impl TableDisplay for QueryReport {
    fn to_table(&self) -> String {
        let mut output = format!(
            "Driver {}  CUDA {}  Attached GPUs: {}\n",
            self.driver_version, self.cuda_version, self.attached_gpus
        );
        if let Some(err) = &self.decode_error {
            output.push_str(&format!("  Decode degraded: {}\n", err));
        }

        for dev in &self.devices {
            output.push_str(&format!("\n[{}] {}\n", dev.id, dev.product_name));
            if let Some(t) = &dev.temperature {
                output.push_str(&format!(
                    "  Temperature:  {} ({}% of limit)\n",
                    t.current_humanized,
                    percent_text(t.used_percent)
                ));
            }
            if let Some(p) = &dev.power {
                output.push_str(&format!(
                    "  Power:        {} / {} ({}%)\n",
                    p.power_draw_humanized,
                    p.current_power_limit_humanized,
                    percent_text(p.used_percent)
                ));
            }
            if let Some(m) = &dev.memory {
                output.push_str(&format!(
                    "  Memory:       {} / {} ({}%)\n",
                    m.used_humanized,
                    m.total_humanized,
                    percent_text(m.used_percent)
                ));
            }
            for err in &dev.errors {
                output.push_str(&format!("  ✗ {}\n", err));
            }
        }

        output
    }
}

fn percent_text(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| crate::telemetry::UNAVAILABLE_PERCENT.to_string())
}

impl TableDisplay for Document {
    /// The decoded document has no tabular form; render it as YAML
    fn to_table(&self) -> String {
        self.to_yaml()
            .unwrap_or_else(|e| format!("failed to render document: {}", e))
    }
}

/// Output of the scan command
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub tool_present: bool,
    pub library_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
    pub gpu_errors: Option<Vec<String>>,
    pub hw_slowdown_errors: Option<Vec<String>>,
    pub ecc_errors: Option<Vec<String>>,
    /// First fault event seen during the wait, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_event: Option<FaultEvent>,
    /// Seconds spent waiting for a fault event (0 when skipped)
    pub event_wait_secs: u64,
}

impl ScanReport {
    /// Nothing found by any scan
    pub fn is_healthy(&self) -> bool {
        self.gpu_errors.is_none()
            && self.hw_slowdown_errors.is_none()
            && self.ecc_errors.is_none()
            && self.fault_event.is_none()
    }
}

fn list_section(output: &mut String, title: &str, items: &Option<Vec<String>>) {
    match items {
        None => output.push_str(&check_line(true, &format!("no {} found", title))),
        Some(items) => {
            output.push_str(&check_line(false, &format!("{} found", title)));
            for item in items {
                output.push_str(&format!("    {}\n", item));
            }
        }
    }
}

impl TableDisplay for ScanReport {
    fn to_table(&self) -> String {
        let mut output = String::new();

        if !self.tool_present {
            output.push_str(&check_line(true, "nvidia-smi not found -- skipping GPU checks"));
        } else {
            if let Some(err) = &self.decode_error {
                output.push_str(&check_line(false, &format!("decode degraded: {}", err)));
            }
            list_section(&mut output, "GPU errors", &self.gpu_errors);
            list_section(&mut output, "hardware slowdown", &self.hw_slowdown_errors);
            list_section(&mut output, "volatile uncorrectable ECC errors", &self.ecc_errors);
        }

        if !self.library_present {
            output.push_str(&check_line(true, "NVML not found -- skipping event check"));
        } else if self.event_wait_secs > 0 {
            match &self.fault_event {
                None => output.push_str(&check_line(
                    true,
                    &format!("no xid events found after {} seconds", self.event_wait_secs),
                )),
                Some(ev) => {
                    output.push_str(&check_line(false, "received a fault event"));
                    output.push_str(&format!("    {}\n", ev.to_table()));
                }
            }
        }

        output
    }
}

impl TableDisplay for FaultEvent {
    fn to_table(&self) -> String {
        if let Some(err) = &self.error {
            return format!("{}: {}", self.message, err);
        }

        let mut line = format!("xid {}", self.xid);
        if self.xid_critical_error {
            line.push_str(" (critical)");
        }
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" {}", detail.name));
        }
        if let Some(uuid) = &self.uuid {
            line.push_str(&format!(" [{}]", uuid));
        }
        line.push_str(&format!(" [{}] {}", self.event_type, self.message));
        line
    }
}

impl TableDisplay for Snapshot {
    fn to_table(&self) -> String {
        let mut output = format!("{}\n", self.message);

        for dev in &self.device_infos {
            output.push_str(&format!(
                "\n[{}] {} (minor {}, bus {:#04x}, device {:#04x}, {} cores)\n",
                dev.uuid, dev.name, dev.minor_number, dev.bus, dev.device, dev.gpu_cores
            ));
            output.push_str(&format!(
                "  Fault events: {} ({})\n",
                if dev.error_supported { "registered" } else { "unsupported" },
                dev.supported_events
            ));
            if let Some(t) = &dev.temperature {
                output.push_str(&format!(
                    "  Temperature:  {}°C (shutdown {}%, slowdown {}%){}\n",
                    t.current_celsius_gpu_core,
                    percent_text(t.used_percent_shutdown),
                    percent_text(t.used_percent_slowdown),
                    if t.is_throttling() { " ✗ throttling" } else { "" }
                ));
            }
            if let Some(p) = &dev.power {
                output.push_str(&format!(
                    "  Power:        {:.1} W ({}% of enforced limit)\n",
                    p.usage_watts(),
                    percent_text(p.used_percent)
                ));
            }
            if let Some(m) = &dev.memory {
                output.push_str(&format!(
                    "  Memory:       {} / {} ({}%)\n",
                    m.used_humanized,
                    m.total_humanized,
                    percent_text(m.used_percent)
                ));
            }
            if let Some(u) = &dev.utilization {
                output.push_str(&format!(
                    "  Utilization:  GPU {}%, memory {}%\n",
                    u.gpu_used_percent, u.memory_used_percent
                ));
            }
            if let Some(c) = &dev.clock_speed {
                output.push_str(&format!(
                    "  Clocks:       graphics {} MHz, SM {} MHz, memory {} MHz\n",
                    c.graphics_mhz, c.sm_mhz, c.memory_mhz
                ));
            }
            if let Some(ev) = &dev.clock_events {
                if !ev.reasons.is_empty() {
                    output.push_str(&format!(
                        "  Clock events: {}{}\n",
                        ev.reasons.join(", "),
                        if ev.is_hw_slowdown() { " ✗ hardware slowdown" } else { "" }
                    ));
                }
            }
            if let Some(ecc) = &dev.ecc_errors {
                if ecc.supported {
                    output.push_str(&format!(
                        "  ECC:          volatile {}/{}, aggregate {}/{} (corrected/uncorrected)\n",
                        ecc.volatile_total.corrected,
                        ecc.volatile_total.uncorrected,
                        ecc.aggregate_total.corrected,
                        ecc.aggregate_total.uncorrected
                    ));
                }
            }
            if let Some(procs) = &dev.processes {
                output.push_str(&format!(
                    "  Processes:    {} using {}\n",
                    procs.running_processes.len(),
                    humanize_bytes(procs.total_used_memory())
                ));
                for p in &procs.running_processes {
                    output.push_str(&format!(
                        "    {:<8} {:<10} {}\n",
                        p.pid,
                        p.gpu_used_memory_bytes_humanized,
                        p.cmd_args.join(" ")
                    ));
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NvmlError;
    use crate::nvml::{EventTypeMask, RawEvent};

    #[test]
    fn test_scan_report_healthy_table() {
        let report = ScanReport {
            tool_present: true,
            library_present: true,
            event_wait_secs: 7,
            ..Default::default()
        };
        assert!(report.is_healthy());

        let table = report.to_table();
        assert!(table.contains("✓ no GPU errors found"));
        assert!(table.contains("no xid events found after 7 seconds"));
    }

    #[test]
    fn test_scan_report_lists_errors() {
        let report = ScanReport {
            tool_present: true,
            gpu_errors: Some(vec!["GPU 0: FanSpeed Unknown Error".to_string()]),
            ..Default::default()
        };
        assert!(!report.is_healthy());

        let table = report.to_table();
        assert!(table.contains("✗ GPU errors found"));
        assert!(table.contains("    GPU 0: FanSpeed Unknown Error"));
        assert!(table.contains("NVML not found"));
    }

    #[test]
    fn test_fault_event_table() {
        let ev = FaultEvent::from_raw(RawEvent {
            event_type: EventTypeMask::XID_CRITICAL_ERROR,
            xid: Some(79),
            device_uuid: None,
        });
        let line = ev.to_table();
        assert!(line.starts_with("xid 79 (critical) GPU has fallen off the bus"));

        let failed = FaultEvent::wait_failed(&NvmlError::GpuLost);
        assert!(failed.to_table().starts_with("event set wait returned non-success"));
    }

    #[test]
    fn test_snapshot_table_flags() {
        use crate::domain::{ClockEvents, Process, Processes, Temperature, ThermalThresholds};
        use crate::domain::clock::reason_bits;
        use crate::monitor::DeviceInfo;

        let thresholds = ThermalThresholds {
            shutdown: Some(92),
            slowdown: Some(89),
            mem_max: None,
            gpu_max: None,
        };
        let device = DeviceInfo {
            uuid: "GPU-1".to_string(),
            name: "NVIDIA H100".to_string(),
            temperature: Some(Temperature::new("GPU-1", 90, None, thresholds)),
            clock_events: Some(ClockEvents::from_bits(
                "GPU-1",
                reason_bits::HW_SLOWDOWN | reason_bits::HW_THERMAL_SLOWDOWN,
            )),
            processes: Some(Processes {
                uuid: "GPU-1".to_string(),
                running_processes: vec![Process::new(10, 1_000_000), Process::new(11, 2_000_000)],
            }),
            ..Default::default()
        };
        let snapshot = Snapshot {
            exists: true,
            message: "NVML found".to_string(),
            device_infos: vec![device],
        };

        let table = snapshot.to_table();
        assert!(table.contains("✗ throttling"));
        assert!(table.contains("✗ hardware slowdown"));
        assert!(table.contains(&format!("Processes:    2 using {}", humanize_bytes(3_000_000))));
    }

    #[test]
    fn test_snapshot_table_healthy_device() {
        use crate::domain::{ClockEvents, Temperature, ThermalThresholds};
        use crate::domain::clock::reason_bits;
        use crate::monitor::DeviceInfo;

        let device = DeviceInfo {
            uuid: "GPU-2".to_string(),
            temperature: Some(Temperature::new("GPU-2", 40, None, ThermalThresholds::default())),
            clock_events: Some(ClockEvents::from_bits("GPU-2", reason_bits::GPU_IDLE)),
            ..Default::default()
        };
        let snapshot = Snapshot {
            exists: true,
            message: String::new(),
            device_infos: vec![device],
        };

        let table = snapshot.to_table();
        assert!(!table.contains("✗"));
    }

    #[test]
    fn test_render_yaml() {
        let report = ScanReport::default();
        let yaml = render(&report, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("tool_present: false"));
        assert!(yaml.contains("gpu_errors: null"));
    }
}
