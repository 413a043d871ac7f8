//! Trait definitions for GPU operations
//!
//! These traits abstract over NVML to enable testing with mocks.

use crate::domain::{
    ClockEvents, ClockSpeed, DeviceAttributes, EccErrors, Memory, NvLink, Power, Processes,
    Temperature, Utilization,
};
use crate::error::NvmlError;
use crate::nvml::events::{EventTypeMask, RawEvent};

use std::time::Duration;

/// Trait for GPU device operations
///
/// One method per metric class of a snapshot. Every returned record carries
/// the device UUID.
pub trait GpuDevice: Send + Sync {
    /// Get the GPU UUID
    fn uuid(&self) -> Result<String, NvmlError>;

    /// Static attributes: minor number, PCI address, name, core count
    fn attributes(&self) -> Result<DeviceAttributes, NvmlError>;

    /// Event types this device can deliver
    fn supported_event_types(&self) -> Result<EventTypeMask, NvmlError>;

    fn clock_events(&self) -> Result<ClockEvents, NvmlError>;

    fn clock_speed(&self) -> Result<ClockSpeed, NvmlError>;

    fn memory(&self) -> Result<Memory, NvmlError>;

    /// Link states; empty when the device has no NVLink
    fn nvlink(&self) -> Result<NvLink, NvmlError>;

    fn power(&self) -> Result<Power, NvmlError>;

    fn temperature(&self) -> Result<Temperature, NvmlError>;

    fn utilization(&self) -> Result<Utilization, NvmlError>;

    /// Compute processes, without command lines
    fn processes(&self) -> Result<Processes, NvmlError>;

    /// ECC counters; `supported` is false on devices without ECC
    fn ecc_errors(&self) -> Result<EccErrors, NvmlError>;
}

/// Blocking wait on a registered event set
pub trait EventWaiter: Send {
    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `NvmlError::Timeout` when nothing arrived; that is not a fault.
    fn wait(&mut self, timeout: Duration) -> Result<RawEvent, NvmlError>;

    /// Free the event set. Safe to call more than once.
    fn release(&mut self) -> Result<(), NvmlError>;
}

/// Trait for managing the library handle and its devices
pub trait GpuManager: Send + Sync + Sized {
    /// The device type returned by this manager
    type Device: GpuDevice;

    /// The event set type created by this manager
    type Events: EventWaiter + 'static;

    /// Every device visible to the library, in enumeration order
    fn devices(&self) -> Result<Vec<Self::Device>, NvmlError>;

    /// Create an empty event set
    fn create_event_set(&self) -> Result<Self::Events, NvmlError>;

    /// Register `device` for `mask` on `events`.
    ///
    /// A device that supports none of the types returns `NotSupported` and the
    /// event set stays usable.
    fn register_events(
        &self,
        device: &Self::Device,
        mask: EventTypeMask,
        events: &Self::Events,
    ) -> Result<(), NvmlError>;

    /// Get driver version
    fn driver_version(&self) -> Result<String, NvmlError>;

    /// Release the library handle
    fn shutdown(self) -> Result<(), NvmlError>;
}
