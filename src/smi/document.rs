//! Decoded verbose query output
//!
//! Field names on the raw records are the tool's own keys, so the same
//! structs decode the rewritten text and serialize back to the compatibility
//! JSON/YAML form. Values stay strings here; typed numbers live in
//! [`crate::telemetry`].

use serde::{Deserialize, Deserializer, Serialize};

/// Reads a possibly-null scalar as a string, null becoming empty.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

/// Root decode result of one query invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub timestamp: String,
    pub driver_version: String,
    pub cuda_version: String,
    pub attached_gpus: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gpus: Vec<DeviceRecord>,

    /// Original verbose output, only kept on a full decode
    #[serde(skip_serializing_if = "is_empty")]
    pub raw: String,

    /// Output of the non-verbose summary mode
    #[serde(skip_serializing_if = "is_empty")]
    pub summary: String,

    /// Set when the summary mode failed with a device error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_failure: Option<String>,
}

impl Document {
    /// Declared and decoded device counts agree
    pub fn device_count_matches(&self) -> bool {
        self.attached_gpus == self.gpus.len()
    }

    /// Copy each device id into the sub-records that carry one
    pub fn propagate_ids(&mut self) {
        for gpu in &mut self.gpus {
            let id = gpu.id.clone();
            if let Some(ecc) = gpu.ecc_errors.as_mut() {
                ecc.id = id.clone();
            }
            if let Some(temp) = gpu.temperature.as_mut() {
                temp.id = id.clone();
            }
            if let Some(power) = gpu.power_readings.as_mut() {
                power.id = id.clone();
            }
            if let Some(mem) = gpu.fb_memory_usage.as_mut() {
                mem.id = id.clone();
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// One physical device block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    /// Original block header, e.g. `GPU 00000000:53:00.0`
    #[serde(rename = "ID", deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(rename = "Product Name", deserialize_with = "null_as_empty")]
    pub product_name: String,
    #[serde(rename = "Product Brand", deserialize_with = "null_as_empty")]
    pub product_brand: String,
    #[serde(rename = "Product Architecture", deserialize_with = "null_as_empty")]
    pub product_architecture: String,

    #[serde(rename = "Persistence Mode", deserialize_with = "null_as_empty")]
    pub persistence_mode: String,
    #[serde(rename = "Addressing Mode", deserialize_with = "null_as_empty")]
    pub addressing_mode: String,

    #[serde(rename = "GPU Reset Status", skip_serializing_if = "Option::is_none")]
    pub reset_status: Option<ResetStatus>,

    #[serde(
        rename = "Clocks Event Reasons",
        alias = "Clocks Throttle Reasons",
        skip_serializing_if = "Option::is_none"
    )]
    pub clock_event_reasons: Option<ClockEventReasons>,

    #[serde(rename = "ECC Errors", skip_serializing_if = "Option::is_none")]
    pub ecc_errors: Option<EccErrors>,

    #[serde(rename = "Temperature", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureReadings>,

    #[serde(rename = "GPU Power Readings", skip_serializing_if = "Option::is_none")]
    pub power_readings: Option<PowerReadings>,

    #[serde(rename = "Processes", skip_serializing_if = "Option::is_none")]
    pub processes: Option<ProcessList>,

    #[serde(rename = "FB Memory Usage")]
    pub fb_memory_usage: Option<FbMemoryUsage>,

    #[serde(rename = "Fan Speed", deserialize_with = "null_as_empty")]
    pub fan_speed: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetStatus {
    #[serde(rename = "Reset Required", deserialize_with = "null_as_empty")]
    pub reset_required: String,
    #[serde(rename = "Drain and Reset Recommended", deserialize_with = "null_as_empty")]
    pub drain_and_reset_recommended: String,
}

/// Value of an active clock event flag
pub const CLOCK_EVENT_ACTIVE: &str = "Active";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockEventReasons {
    #[serde(rename = "SW Power Cap", deserialize_with = "null_as_empty")]
    pub sw_power_cap: String,
    #[serde(rename = "SW Thermal Slowdown", deserialize_with = "null_as_empty")]
    pub sw_thermal_slowdown: String,
    #[serde(rename = "HW Slowdown", deserialize_with = "null_as_empty")]
    pub hw_slowdown: String,
    #[serde(rename = "HW Thermal Slowdown", deserialize_with = "null_as_empty")]
    pub hw_thermal_slowdown: String,
    #[serde(rename = "HW Power Brake Slowdown", deserialize_with = "null_as_empty")]
    pub hw_power_brake_slowdown: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EccErrors {
    #[serde(rename = "id", deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(rename = "Aggregate", skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<EccAggregate>,

    #[serde(
        rename = "Aggregate Uncorrectable SRAM Sources",
        skip_serializing_if = "Option::is_none"
    )]
    pub aggregate_uncorrectable_sram_sources: Option<EccSramSources>,

    #[serde(rename = "Volatile", skip_serializing_if = "Option::is_none")]
    pub volatile: Option<EccVolatile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EccAggregate {
    #[serde(rename = "DRAM Correctable", deserialize_with = "null_as_empty")]
    pub dram_correctable: String,
    #[serde(rename = "DRAM Uncorrectable", deserialize_with = "null_as_empty")]
    pub dram_uncorrectable: String,
    #[serde(rename = "SRAM Correctable", deserialize_with = "null_as_empty")]
    pub sram_correctable: String,
    #[serde(rename = "SRAM Threshold Exceeded", deserialize_with = "null_as_empty")]
    pub sram_threshold_exceeded: String,
    #[serde(rename = "SRAM Uncorrectable", deserialize_with = "null_as_empty")]
    pub sram_uncorrectable: String,
    /// Newer drivers split SRAM uncorrectable counts by detection kind
    #[serde(rename = "SRAM Uncorrectable Parity", deserialize_with = "null_as_empty")]
    pub sram_uncorrectable_parity: String,
    #[serde(rename = "SRAM Uncorrectable SEC-DED", deserialize_with = "null_as_empty")]
    pub sram_uncorrectable_secded: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EccSramSources {
    #[serde(rename = "SRAM L2", deserialize_with = "null_as_empty")]
    pub l2: String,
    #[serde(rename = "SRAM Microcontroller", deserialize_with = "null_as_empty")]
    pub microcontroller: String,
    #[serde(rename = "SRAM Other", deserialize_with = "null_as_empty")]
    pub other: String,
    #[serde(rename = "SRAM PCIE", deserialize_with = "null_as_empty")]
    pub pcie: String,
    #[serde(rename = "SRAM SM", deserialize_with = "null_as_empty")]
    pub sm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EccVolatile {
    #[serde(rename = "DRAM Correctable", deserialize_with = "null_as_empty")]
    pub dram_correctable: String,
    #[serde(rename = "DRAM Uncorrectable", deserialize_with = "null_as_empty")]
    pub dram_uncorrectable: String,
    #[serde(rename = "SRAM Correctable", deserialize_with = "null_as_empty")]
    pub sram_correctable: String,
    #[serde(rename = "SRAM Uncorrectable", deserialize_with = "null_as_empty")]
    pub sram_uncorrectable: String,
    #[serde(rename = "SRAM Uncorrectable Parity", deserialize_with = "null_as_empty")]
    pub sram_uncorrectable_parity: String,
    #[serde(rename = "SRAM Uncorrectable SEC-DED", deserialize_with = "null_as_empty")]
    pub sram_uncorrectable_secded: String,
}

/// Raw temperature section. Any field may read `"Unknown Error"` on a
/// failing device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureReadings {
    #[serde(rename = "id", deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(rename = "GPU Current Temp", deserialize_with = "null_as_empty")]
    pub current: String,
    #[serde(rename = "GPU T.Limit Temp", deserialize_with = "null_as_empty")]
    pub limit: String,

    /// Older drivers report shutdown/slowdown as plain temperatures
    #[serde(rename = "GPU Shutdown Temp", deserialize_with = "null_as_empty")]
    pub shutdown: String,
    #[serde(rename = "GPU Shutdown T.Limit Temp", deserialize_with = "null_as_empty")]
    pub shutdown_limit: String,

    #[serde(rename = "GPU Slowdown Temp", deserialize_with = "null_as_empty")]
    pub slowdown: String,
    #[serde(rename = "GPU Slowdown T.Limit Temp", deserialize_with = "null_as_empty")]
    pub slowdown_limit: String,

    #[serde(rename = "GPU Max Operating T.Limit Temp", deserialize_with = "null_as_empty")]
    pub max_operating_limit: String,

    /// Frequently N/A
    #[serde(rename = "GPU Target Temperature", deserialize_with = "null_as_empty")]
    pub target: String,

    #[serde(rename = "Memory Current Temp", deserialize_with = "null_as_empty")]
    pub memory_current: String,
    #[serde(
        rename = "Memory Max Operating T.Limit Temp",
        deserialize_with = "null_as_empty"
    )]
    pub memory_max_operating_limit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerReadings {
    #[serde(rename = "id", deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(rename = "Power Draw", deserialize_with = "null_as_empty")]
    pub power_draw: String,
    #[serde(rename = "Current Power Limit", deserialize_with = "null_as_empty")]
    pub current_power_limit: String,
    #[serde(rename = "Requested Power Limit", deserialize_with = "null_as_empty")]
    pub requested_power_limit: String,
    #[serde(rename = "Default Power Limit", deserialize_with = "null_as_empty")]
    pub default_power_limit: String,
    #[serde(rename = "Min Power Limit", deserialize_with = "null_as_empty")]
    pub min_power_limit: String,
    #[serde(rename = "Max Power Limit", deserialize_with = "null_as_empty")]
    pub max_power_limit: String,
}

/// One process entry under the `Processes` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessRecord {
    #[serde(rename = "GPU instance ID", deserialize_with = "null_as_empty")]
    pub gpu_instance_id: String,
    #[serde(rename = "Compute instance ID", deserialize_with = "null_as_empty")]
    pub compute_instance_id: String,
    #[serde(rename = "Process ID")]
    pub process_id: Option<i64>,
    #[serde(rename = "Process Type", deserialize_with = "null_as_empty")]
    pub process_type: String,
    #[serde(rename = "Process Name", deserialize_with = "null_as_empty")]
    pub process_name: String,
    #[serde(rename = "Process Used GPU Memory", deserialize_with = "null_as_empty")]
    pub used_gpu_memory: String,
}

/// Processes listed under one device, in output order.
///
/// The tool prints every process as a run of sibling keys inside one
/// section, so a repeated key starts the next process.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProcessList(pub Vec<ProcessRecord>);

impl ProcessList {
    pub fn iter(&self) -> std::slice::Iter<'_, ProcessRecord> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ProcessList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ProcessListVisitor)
    }
}

struct ProcessListVisitor;

impl<'de> serde::de::Visitor<'de> for ProcessListVisitor {
    type Value = ProcessList;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a map of process fields")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut processes = Vec::new();
        let mut current = ProcessRecord::default();
        let mut seen: Vec<String> = Vec::new();

        while let Some(key) = map.next_key::<String>()? {
            if seen.contains(&key) {
                processes.push(std::mem::take(&mut current));
                seen.clear();
            }

            match key.as_str() {
                "GPU instance ID" => current.gpu_instance_id = next_string(&mut map)?,
                "Compute instance ID" => current.compute_instance_id = next_string(&mut map)?,
                "Process ID" => current.process_id = map.next_value()?,
                "Process Type" => current.process_type = next_string(&mut map)?,
                "Process Name" => current.process_name = next_string(&mut map)?,
                "Process Used GPU Memory" => current.used_gpu_memory = next_string(&mut map)?,
                _ => {
                    map.next_value::<serde::de::IgnoredAny>()?;
                }
            }
            seen.push(key);
        }

        if !seen.is_empty() {
            processes.push(current);
        }
        Ok(ProcessList(processes))
    }
}

fn next_string<'de, A>(map: &mut A) -> Result<String, A::Error>
where
    A: serde::de::MapAccess<'de>,
{
    Ok(map.next_value::<Option<String>>()?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbMemoryUsage {
    #[serde(rename = "id", deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(rename = "Total", deserialize_with = "null_as_empty")]
    pub total: String,
    #[serde(rename = "Reserved", deserialize_with = "null_as_empty")]
    pub reserved: String,
    #[serde(rename = "Used", deserialize_with = "null_as_empty")]
    pub used: String,
    #[serde(rename = "Free", deserialize_with = "null_as_empty")]
    pub free: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagate_ids_into_present_sections() {
        let mut doc = Document {
            gpus: vec![DeviceRecord {
                id: "GPU 00000000:53:00.0".to_string(),
                temperature: Some(TemperatureReadings::default()),
                fb_memory_usage: Some(FbMemoryUsage::default()),
                ..Default::default()
            }],
            ..Default::default()
        };
        doc.propagate_ids();

        let gpu = &doc.gpus[0];
        assert_eq!(gpu.temperature.as_ref().unwrap().id, "GPU 00000000:53:00.0");
        assert_eq!(gpu.fb_memory_usage.as_ref().unwrap().id, "GPU 00000000:53:00.0");
        assert!(gpu.ecc_errors.is_none());
        assert!(gpu.power_readings.is_none());
    }

    #[test]
    fn test_process_list_splits_on_repeated_key() {
        let yaml = "\
GPU instance ID: N/A
Compute instance ID: N/A
Process ID: 1375347
Process Type: C
Process Name: /usr/bin/python
Process Used GPU Memory: 22372 MiB
GPU instance ID: N/A
Compute instance ID: N/A
Process ID: 1375348
Process Type: C
Process Name: /usr/bin/python3
Process Used GPU Memory: 1024 MiB
";
        let list: ProcessList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.0[0].process_id, Some(1375347));
        assert_eq!(list.0[1].process_name, "/usr/bin/python3");
        assert_eq!(list.0[1].used_gpu_memory, "1024 MiB");
    }

    #[test]
    fn test_null_scalar_reads_as_empty() {
        let reasons: ClockEventReasons = serde_yaml::from_str("HW Slowdown: null\n").unwrap();
        assert_eq!(reasons.hw_slowdown, "");
    }

    #[test]
    fn test_document_json_field_names() {
        let doc = Document {
            timestamp: "Tue Jul 30 19:06:40 2024".to_string(),
            driver_version: "535.161.08".to_string(),
            cuda_version: "12.2".to_string(),
            attached_gpus: 0,
            ..Default::default()
        };
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"driver_version\": \"535.161.08\""));
        assert!(json.contains("\"cuda_version\": \"12.2\""));
        assert!(json.contains("\"attached_gpus\": 0"));
        assert!(!json.contains("\"raw\""));
    }
}
