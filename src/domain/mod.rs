//! Domain models for device snapshots
//!
//! One record per metric class queried from the management library. Every
//! record carries the owning device UUID.

pub mod clock;
pub mod gpu;
pub mod memory;
pub mod nvlink;
pub mod performance;
pub mod power;
pub mod process;
pub mod thermal;

pub use clock::{ClockEvents, ClockSpeed};
pub use gpu::DeviceAttributes;
pub use memory::{EccCounts, EccErrors, Memory};
pub use nvlink::{NvLink, NvLinkState};
pub use performance::Utilization;
pub use power::Power;
pub use process::{Process, Processes};
pub use thermal::{Temperature, ThermalThresholds};
