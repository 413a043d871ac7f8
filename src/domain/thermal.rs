//! Thermal domain types
//!
//! Current core temperature and the device's thermal thresholds. A threshold
//! the device does not report is `None` and its percentage reads as zero.

use crate::telemetry::{percent, used_percent};

use serde::Serialize;

/// Thermal thresholds in degrees Celsius
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThermalThresholds {
    /// Temperature at which the device shuts down
    pub shutdown: Option<u32>,
    /// Temperature at which the device throttles
    pub slowdown: Option<u32>,
    /// Maximum memory temperature
    pub mem_max: Option<u32>,
    /// Maximum GPU temperature for normal operation
    pub gpu_max: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Temperature {
    pub uuid: String,

    pub current_celsius_gpu_core: u32,

    /// Memory sensor, where the board has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_celsius_memory: Option<u32>,

    pub threshold_celsius_shutdown: Option<u32>,
    pub threshold_celsius_slowdown: Option<u32>,
    pub threshold_celsius_mem_max: Option<u32>,
    pub threshold_celsius_gpu_max: Option<u32>,

    #[serde(serialize_with = "percent")]
    pub used_percent_shutdown: Option<f64>,
    #[serde(serialize_with = "percent")]
    pub used_percent_slowdown: Option<f64>,
    #[serde(serialize_with = "percent")]
    pub used_percent_mem_max: Option<f64>,
    #[serde(serialize_with = "percent")]
    pub used_percent_gpu_max: Option<f64>,
}

fn against(current: u32, threshold: Option<u32>) -> Option<f64> {
    threshold.and_then(|t| used_percent(current as f64, t as f64))
}

impl Temperature {
    pub fn new(
        uuid: impl Into<String>,
        current: u32,
        memory: Option<u32>,
        thresholds: ThermalThresholds,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            current_celsius_gpu_core: current,
            current_celsius_memory: memory,
            threshold_celsius_shutdown: thresholds.shutdown,
            threshold_celsius_slowdown: thresholds.slowdown,
            threshold_celsius_mem_max: thresholds.mem_max,
            threshold_celsius_gpu_max: thresholds.gpu_max,
            used_percent_shutdown: against(current, thresholds.shutdown),
            used_percent_slowdown: against(current, thresholds.slowdown),
            used_percent_mem_max: against(current, thresholds.mem_max),
            used_percent_gpu_max: against(current, thresholds.gpu_max),
        }
    }

    /// At or past the slowdown threshold
    pub fn is_throttling(&self) -> bool {
        self.threshold_celsius_slowdown
            .map(|t| self.current_celsius_gpu_core >= t)
            .unwrap_or(false)
    }
}
