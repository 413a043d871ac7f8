//! Per-device metric snapshot

use crate::domain::{
    ClockEvents, ClockSpeed, DeviceAttributes, EccErrors, Memory, NvLink, Power, Processes,
    Temperature, Utilization,
};
use crate::error::{AppError, NvmlError};
use crate::nvml::{EventTypeMask, GpuDevice};

use serde::Serialize;
use std::path::Path;

/// Result of one `get` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Whether the management library is present
    pub exists: bool,
    pub message: String,
    /// Sorted by UUID
    pub device_infos: Vec<DeviceInfo>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string_pretty(self).map_err(AppError::from)
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(self).map_err(AppError::from)
    }
}

/// One device's static attributes and metric records.
///
/// Metric records stay `None` when a query failed before reaching them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub uuid: String,

    pub minor_number: u32,
    pub bus: u32,
    pub device: u32,
    pub name: String,
    pub gpu_cores: u32,

    pub supported_events: EventTypeMask,
    /// False when the device could not be registered for fault events
    pub error_supported: bool,

    pub clock_events: Option<ClockEvents>,
    pub clock_speed: Option<ClockSpeed>,
    pub memory: Option<Memory>,
    pub nvlink: Option<NvLink>,
    pub power: Option<Power>,
    pub temperature: Option<Temperature>,
    pub utilization: Option<Utilization>,
    pub processes: Option<Processes>,
    pub ecc_errors: Option<EccErrors>,
}

impl DeviceInfo {
    pub fn new(
        uuid: impl Into<String>,
        attributes: &DeviceAttributes,
        supported_events: EventTypeMask,
        error_supported: bool,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            minor_number: attributes.minor_number,
            bus: attributes.bus,
            device: attributes.device,
            name: attributes.name.clone(),
            gpu_cores: attributes.gpu_cores,
            supported_events,
            error_supported,
            ..Default::default()
        }
    }

    /// Query every metric class in order, stopping at the first failure
    pub fn collect<D: GpuDevice>(&mut self, device: &D, proc_root: &Path) -> Result<(), NvmlError> {
        self.clock_events = Some(device.clock_events()?);
        self.clock_speed = Some(device.clock_speed()?);
        self.memory = Some(device.memory()?);
        self.nvlink = Some(device.nvlink()?);
        self.power = Some(device.power()?);
        self.temperature = Some(device.temperature()?);
        self.utilization = Some(device.utilization()?);

        let mut processes = device.processes()?;
        processes.resolve_cmdlines(proc_root);
        self.processes = Some(processes);

        self.ecc_errors = Some(device.ecc_errors()?);
        Ok(())
    }

    /// Every metric class was collected
    pub fn is_complete(&self) -> bool {
        self.ecc_errors.is_some()
    }
}
