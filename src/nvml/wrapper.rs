//! NVML manager implementation
//!
//! Owns the library handle. Devices and event sets borrow from it.

use crate::error::NvmlError;
use crate::nvml::device::{register_events_raw, NvmlDevice, NVML_LIBRARY};
use crate::nvml::events::{EventTypeMask, NvmlEvents};
use crate::nvml::traits::GpuManager;

use nvml_wrapper::Nvml;

/// NVML manager for GPU discovery and event registration
pub struct NvmlManager {
    // Boxed so the address handed out as `'static` stays put when the
    // manager moves.
    nvml: Box<Nvml>,
}

impl NvmlManager {
    /// Initialize NVML and create a new manager
    pub fn new() -> Result<Self, NvmlError> {
        let nvml = Nvml::init().map_err(|e| match e {
            nvml_wrapper::error::NvmlError::LibloadingError(_) => NvmlError::LibraryNotFound,
            nvml_wrapper::error::NvmlError::DriverNotLoaded => {
                NvmlError::InitializationFailed("NVIDIA driver not loaded".to_string())
            }
            other => NvmlError::InitializationFailed(other.to_string()),
        })?;

        log::debug!("NVML initialized");
        Ok(Self {
            nvml: Box::new(nvml),
        })
    }

    /// True when the shared library can be loaded on this host
    pub fn library_available() -> bool {
        // SAFETY: loading the library runs its initializers only; no symbols
        // are called.
        unsafe { libloading::Library::new(NVML_LIBRARY) }.is_ok()
    }

    fn nvml_static(&self) -> &'static Nvml {
        // SAFETY: We're extending the lifetime here which is safe because
        // devices and event sets never outlive the manager: the monitor
        // releases them before calling `shutdown`. This is a limitation of
        // the nvml-wrapper API design.
        unsafe { std::mem::transmute::<&Nvml, &'static Nvml>(&*self.nvml) }
    }
}

impl GpuManager for NvmlManager {
    type Device = NvmlDevice<'static>;
    type Events = NvmlEvents;

    fn devices(&self) -> Result<Vec<Self::Device>, NvmlError> {
        let nvml = self.nvml_static();
        let count = nvml.device_count()?;

        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            let device = nvml.device_by_index(index).map_err(|e| match e {
                nvml_wrapper::error::NvmlError::NotFound => NvmlError::DeviceNotFound(index),
                other => NvmlError::from(other),
            })?;
            devices.push(NvmlDevice::new(device));
        }
        Ok(devices)
    }

    fn create_event_set(&self) -> Result<Self::Events, NvmlError> {
        let set = self.nvml_static().create_event_set()?;
        Ok(NvmlEvents::new(set))
    }

    fn register_events(
        &self,
        device: &Self::Device,
        mask: EventTypeMask,
        events: &Self::Events,
    ) -> Result<(), NvmlError> {
        let set = events.raw_handle().ok_or(NvmlError::NotInitialized)?;
        register_events_raw(device.raw_handle(), mask.bits(), set)
    }

    fn driver_version(&self) -> Result<String, NvmlError> {
        self.nvml.sys_driver_version().map_err(NvmlError::from)
    }

    fn shutdown(self) -> Result<(), NvmlError> {
        (*self.nvml).shutdown().map_err(NvmlError::from)
    }
}
