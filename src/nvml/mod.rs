//! NVML abstraction layer
//!
//! Provides trait-based abstractions over NVML for testability.

pub mod device;
pub mod events;
pub mod traits;
pub mod wrapper;

pub use device::NvmlDevice;
pub use events::{EventTypeMask, NvmlEvents, RawEvent};
pub use traits::{EventWaiter, GpuDevice, GpuManager};
pub use wrapper::NvmlManager;
