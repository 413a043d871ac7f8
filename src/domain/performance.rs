//! Utilization domain types

use serde::Serialize;

/// Percent of time over the last sample period the engines were busy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Utilization {
    pub uuid: String,
    pub gpu_used_percent: u32,
    pub memory_used_percent: u32,
}

impl Utilization {
    pub fn new(uuid: impl Into<String>, gpu: u32, memory: u32) -> Self {
        Self {
            uuid: uuid.into(),
            gpu_used_percent: gpu.min(100),
            memory_used_percent: memory.min(100),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.gpu_used_percent == 0 && self.memory_used_percent == 0
    }
}
