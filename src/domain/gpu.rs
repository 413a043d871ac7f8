//! Static device attributes

use serde::Serialize;

/// Attributes read once when a device is first enumerated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceAttributes {
    pub minor_number: u32,
    /// PCI bus number
    pub bus: u32,
    /// PCI device number
    pub device: u32,
    pub name: String,
    pub gpu_cores: u32,
}
