//! Clock domain types

use serde::{Deserialize, Serialize};

/// Raw reason bits, as defined by the management library
pub mod reason_bits {
    pub const GPU_IDLE: u64 = 0x1;
    pub const APPLICATIONS_CLOCKS_SETTING: u64 = 0x2;
    pub const SW_POWER_CAP: u64 = 0x4;
    pub const HW_SLOWDOWN: u64 = 0x8;
    pub const SYNC_BOOST: u64 = 0x10;
    pub const SW_THERMAL_SLOWDOWN: u64 = 0x20;
    pub const HW_THERMAL_SLOWDOWN: u64 = 0x40;
    pub const HW_POWER_BRAKE_SLOWDOWN: u64 = 0x80;
    pub const DISPLAY_CLOCK_SETTING: u64 = 0x100;
}

const REASON_NAMES: [(u64, &str); 9] = [
    (reason_bits::GPU_IDLE, "GPU idle"),
    (reason_bits::APPLICATIONS_CLOCKS_SETTING, "applications clocks setting"),
    (reason_bits::SW_POWER_CAP, "SW power cap"),
    (reason_bits::HW_SLOWDOWN, "HW slowdown"),
    (reason_bits::SYNC_BOOST, "sync boost"),
    (reason_bits::SW_THERMAL_SLOWDOWN, "SW thermal slowdown"),
    (reason_bits::HW_THERMAL_SLOWDOWN, "HW thermal slowdown"),
    (reason_bits::HW_POWER_BRAKE_SLOWDOWN, "HW power brake slowdown"),
    (reason_bits::DISPLAY_CLOCK_SETTING, "display clock setting"),
];

/// Why the clocks are currently held below their maximum
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEvents {
    pub uuid: String,

    /// Raw reason bitmask
    pub reasons_bitmask: u64,

    pub hw_slowdown: bool,
    pub hw_slowdown_thermal: bool,
    pub hw_slowdown_power_brake: bool,

    /// Names of every active reason
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl ClockEvents {
    pub fn from_bits(uuid: impl Into<String>, bits: u64) -> Self {
        Self {
            uuid: uuid.into(),
            reasons_bitmask: bits,
            hw_slowdown: bits & reason_bits::HW_SLOWDOWN != 0,
            hw_slowdown_thermal: bits & reason_bits::HW_THERMAL_SLOWDOWN != 0,
            hw_slowdown_power_brake: bits & reason_bits::HW_POWER_BRAKE_SLOWDOWN != 0,
            reasons: REASON_NAMES
                .iter()
                .filter(|(bit, _)| bits & bit != 0)
                .map(|(_, name)| name.to_string())
                .collect(),
        }
    }

    /// Any hardware-initiated slowdown
    pub fn is_hw_slowdown(&self) -> bool {
        self.hw_slowdown || self.hw_slowdown_thermal || self.hw_slowdown_power_brake
    }
}

/// Current clock frequencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSpeed {
    pub uuid: String,
    pub graphics_mhz: u32,
    pub sm_mhz: u32,
    pub memory_mhz: u32,
    pub video_mhz: u32,
}
