//! NVML device implementation
//!
//! Real implementation of GpuDevice trait using nvml-wrapper, with raw FFI
//! for the calls the binding does not expose.

use crate::domain::nvlink::MAX_LINKS;
use crate::domain::{
    ClockEvents, ClockSpeed, DeviceAttributes, EccCounts, EccErrors, Memory, NvLink, NvLinkState,
    Power, Process, Processes, Temperature, ThermalThresholds, Utilization,
};
use crate::error::NvmlError;
use crate::nvml::events::EventTypeMask;
use crate::nvml::traits::GpuDevice;

use nvml_wrapper::enum_wrappers::device::{
    Clock, EccCounter, MemoryError, TemperatureSensor, TemperatureThreshold,
};
use nvml_wrapper::Device;

pub(crate) const NVML_LIBRARY: &str = "libnvidia-ml.so.1";

// Not exposed by nvml-wrapper's high-level API
const NVML_TEMPERATURE_THRESHOLD_MEM_MAX: u32 = 2;

// nvmlReturn_t codes checked directly on raw calls
const NVML_ERROR_NOT_SUPPORTED: u32 = 3;
const NVML_ERROR_INSUFFICIENT_SIZE: u32 = 7;

/// NVML device wrapper implementing GpuDevice trait
pub struct NvmlDevice<'a> {
    device: Device<'a>,
}

impl<'a> NvmlDevice<'a> {
    /// Create a new NVML device wrapper
    pub fn new(device: Device<'a>) -> Self {
        Self { device }
    }

    pub(crate) fn raw_handle(&self) -> nvml_wrapper_sys::bindings::nvmlDevice_t {
        // SAFETY: handle() is safe to call within the lifetime of the Device
        unsafe { self.device.handle() }
    }

    fn ecc_counts(&self, aggregate: bool) -> Result<EccCounts, NvmlError> {
        let counter = || {
            if aggregate {
                EccCounter::Aggregate
            } else {
                EccCounter::Volatile
            }
        };
        Ok(EccCounts {
            corrected: self.device.total_ecc_errors(MemoryError::Corrected, counter())?,
            uncorrected: self.device.total_ecc_errors(MemoryError::Uncorrected, counter())?,
        })
    }
}

impl GpuDevice for NvmlDevice<'_> {
    fn uuid(&self) -> Result<String, NvmlError> {
        self.device.uuid().map_err(NvmlError::from)
    }

    fn attributes(&self) -> Result<DeviceAttributes, NvmlError> {
        let pci = self.device.pci_info()?;
        Ok(DeviceAttributes {
            minor_number: self.device.minor_number()?,
            bus: pci.bus,
            device: pci.device,
            name: self.device.name()?,
            gpu_cores: self.device.num_cores()?,
        })
    }

    fn supported_event_types(&self) -> Result<EventTypeMask, NvmlError> {
        let types = self.device.supported_event_types()?;
        Ok(EventTypeMask::from_bits(types.bits()))
    }

    fn clock_events(&self) -> Result<ClockEvents, NvmlError> {
        let reasons = self.device.current_throttle_reasons()?;
        Ok(ClockEvents::from_bits(self.uuid()?, reasons.bits()))
    }

    fn clock_speed(&self) -> Result<ClockSpeed, NvmlError> {
        Ok(ClockSpeed {
            uuid: self.uuid()?,
            graphics_mhz: self.device.clock_info(Clock::Graphics)?,
            sm_mhz: self.device.clock_info(Clock::SM)?,
            memory_mhz: self.device.clock_info(Clock::Memory)?,
            video_mhz: self.device.clock_info(Clock::Video)?,
        })
    }

    fn memory(&self) -> Result<Memory, NvmlError> {
        let mem = self.device.memory_info()?;
        Ok(Memory::new(self.uuid()?, mem.total, mem.used, mem.free))
    }

    fn nvlink(&self) -> Result<NvLink, NvmlError> {
        use nvml_wrapper::error::NvmlError as NE;

        let mut states = Vec::new();
        for link in 0..MAX_LINKS {
            match self.device.link_wrapper_for(link).is_active() {
                Ok(active) => states.push(NvLinkState { link, active }),
                // Past the last link, or no NVLink at all
                Err(NE::NotSupported) | Err(NE::InvalidArg) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(NvLink {
            uuid: self.uuid()?,
            states,
        })
    }

    fn power(&self) -> Result<Power, NvmlError> {
        Ok(Power::new(
            self.uuid()?,
            self.device.power_usage()?,
            self.device.enforced_power_limit()?,
            self.device.power_management_limit()?,
        ))
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        let current = self.device.temperature(TemperatureSensor::Gpu)?;

        let threshold = |kind| self.device.temperature_threshold(kind).ok();
        let thresholds = ThermalThresholds {
            shutdown: threshold(TemperatureThreshold::Shutdown),
            slowdown: threshold(TemperatureThreshold::Slowdown),
            mem_max: get_temperature_threshold_raw(
                self.raw_handle(),
                NVML_TEMPERATURE_THRESHOLD_MEM_MAX,
            )
            .ok(),
            gpu_max: threshold(TemperatureThreshold::GpuMax),
        };

        let memory = match get_memory_temperature_raw(self.raw_handle()) {
            Ok(temp) => Some(temp),
            Err(NvmlError::NotSupported(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(Temperature::new(self.uuid()?, current, memory, thresholds))
    }

    fn utilization(&self) -> Result<Utilization, NvmlError> {
        let util = self.device.utilization_rates()?;
        Ok(Utilization::new(self.uuid()?, util.gpu, util.memory))
    }

    fn processes(&self) -> Result<Processes, NvmlError> {
        Ok(Processes {
            uuid: self.uuid()?,
            running_processes: get_compute_processes_raw(self.raw_handle())?,
        })
    }

    fn ecc_errors(&self) -> Result<EccErrors, NvmlError> {
        let uuid = self.uuid()?;

        match self.device.is_ecc_enabled() {
            Ok(state) if state.currently_enabled => {}
            Ok(_) | Err(nvml_wrapper::error::NvmlError::NotSupported) => {
                return Ok(EccErrors::unsupported(uuid))
            }
            Err(e) => return Err(e.into()),
        }

        Ok(EccErrors {
            uuid,
            supported: true,
            aggregate_total: self.ecc_counts(true)?,
            volatile_total: self.ecc_counts(false)?,
        })
    }
}

fn load_library() -> Result<libloading::Library, NvmlError> {
    // SAFETY: Loading NVML library
    unsafe { libloading::Library::new(NVML_LIBRARY) }
        .or_else(|_| unsafe { libloading::Library::new("libnvidia-ml.so") })
        .map_err(|_e| NvmlError::LibraryNotFound)
}

/// Register a device on an event set using raw FFI.
///
/// The safe binding frees the set when registration fails, which would take
/// every other device's registration down with it.
pub(crate) fn register_events_raw(
    device: nvml_wrapper_sys::bindings::nvmlDevice_t,
    event_types: u64,
    set: nvml_wrapper_sys::bindings::nvmlEventSet_t,
) -> Result<(), NvmlError> {
    use libloading::Symbol;
    use nvml_wrapper_sys::bindings::{nvmlDevice_t, nvmlEventSet_t, nvmlReturn_enum_NVML_SUCCESS};
    use std::os::raw::{c_uint, c_ulonglong};

    type RegisterEventsFn =
        unsafe extern "C" fn(nvmlDevice_t, c_ulonglong, nvmlEventSet_t) -> c_uint;

    let lib = load_library()?;

    // SAFETY: Loading function symbol from library
    let func: Symbol<RegisterEventsFn> = unsafe { lib.get(b"nvmlDeviceRegisterEvents\0") }
        .map_err(|e| NvmlError::NotSupported(format!("Function not available: {}", e)))?;

    let result = unsafe { func(device, event_types, set) };

    if result == nvmlReturn_enum_NVML_SUCCESS {
        Ok(())
    } else if result == NVML_ERROR_NOT_SUPPORTED {
        Err(NvmlError::NotSupported(
            "Event registration not supported on this GPU".to_string(),
        ))
    } else {
        Err(NvmlError::Unknown(format!("NVML error code: {}", result)))
    }
}

/// Get a temperature threshold using raw FFI
fn get_temperature_threshold_raw(
    handle: nvml_wrapper_sys::bindings::nvmlDevice_t,
    threshold_type: u32,
) -> Result<u32, NvmlError> {
    use libloading::Symbol;
    use nvml_wrapper_sys::bindings::nvmlReturn_enum_NVML_SUCCESS;
    use std::os::raw::c_uint;

    type GetThresholdFn = unsafe extern "C" fn(
        nvml_wrapper_sys::bindings::nvmlDevice_t,
        c_uint,
        *mut c_uint,
    ) -> c_uint;

    let lib = load_library()?;

    let func: Symbol<GetThresholdFn> = unsafe { lib.get(b"nvmlDeviceGetTemperatureThreshold\0") }
        .map_err(|e| NvmlError::NotSupported(format!("Function not available: {}", e)))?;

    let mut temp: c_uint = 0;
    let result = unsafe { func(handle, threshold_type, &mut temp) };

    if result == nvmlReturn_enum_NVML_SUCCESS {
        Ok(temp)
    } else if result == NVML_ERROR_NOT_SUPPORTED {
        Err(NvmlError::NotSupported(format!(
            "Temperature threshold {} not supported on this GPU",
            threshold_type
        )))
    } else {
        Err(NvmlError::Unknown(format!("NVML error code: {}", result)))
    }
}

/// Get memory temperature using raw FFI
///
/// NVML_TEMPERATURE_MEMORY = 1
fn get_memory_temperature_raw(
    handle: nvml_wrapper_sys::bindings::nvmlDevice_t,
) -> Result<u32, NvmlError> {
    use libloading::Symbol;
    use nvml_wrapper_sys::bindings::nvmlReturn_enum_NVML_SUCCESS;
    use std::os::raw::c_uint;

    type GetTemperatureFn = unsafe extern "C" fn(
        nvml_wrapper_sys::bindings::nvmlDevice_t,
        c_uint,
        *mut c_uint,
    ) -> c_uint;

    let lib = load_library()?;

    let func: Symbol<GetTemperatureFn> = unsafe { lib.get(b"nvmlDeviceGetTemperature\0") }
        .map_err(|e| NvmlError::NotSupported(format!("Function not available: {}", e)))?;

    let mut temp: c_uint = 0;
    let result = unsafe { func(handle, 1, &mut temp) };

    if result == nvmlReturn_enum_NVML_SUCCESS {
        Ok(temp)
    } else if result == NVML_ERROR_NOT_SUPPORTED {
        Err(NvmlError::NotSupported(
            "Memory temperature not supported on this GPU".to_string(),
        ))
    } else {
        Err(NvmlError::Unknown(format!("NVML error code: {}", result)))
    }
}

/// Get running compute processes using raw NVML C API
///
/// # Safety
/// This function uses unsafe FFI calls to the NVML library.
fn get_compute_processes_raw(
    handle: nvml_wrapper_sys::bindings::nvmlDevice_t,
) -> Result<Vec<Process>, NvmlError> {
    use libloading::Symbol;
    use nvml_wrapper_sys::bindings::{nvmlDevice_t, nvmlReturn_enum_NVML_SUCCESS};
    use std::mem;
    use std::os::raw::{c_uint, c_ulonglong};

    #[repr(C)]
    #[derive(Clone, Copy)]
    #[allow(non_camel_case_types)]
    struct nvmlProcessInfo_t {
        pid: c_uint,
        used_gpu_memory: c_ulonglong,
    }

    let lib = load_library()?;

    type GetComputeProcessesFn =
        unsafe extern "C" fn(nvmlDevice_t, *mut c_uint, *mut nvmlProcessInfo_t) -> c_uint;

    // SAFETY: Loading function symbol from library
    let func: Symbol<GetComputeProcessesFn> =
        unsafe { lib.get(b"nvmlDeviceGetComputeRunningProcesses\0") }
            .map_err(|e| NvmlError::NotSupported(format!("Function not available: {}", e)))?;

    // First call to get count
    let mut count: c_uint = 0;
    let result = unsafe { func(handle, &mut count, std::ptr::null_mut()) };

    if result == NVML_ERROR_INSUFFICIENT_SIZE {
        let mut processes: Vec<nvmlProcessInfo_t> = vec![unsafe { mem::zeroed() }; count as usize];

        let result = unsafe { func(handle, &mut count, processes.as_mut_ptr()) };

        if result == nvmlReturn_enum_NVML_SUCCESS {
            Ok(processes
                .into_iter()
                .take(count as usize)
                .map(|p| Process::new(p.pid, p.used_gpu_memory))
                .collect())
        } else {
            Err(NvmlError::Unknown(format!("NVML error code: {}", result)))
        }
    } else if result == nvmlReturn_enum_NVML_SUCCESS {
        // No processes
        Ok(Vec::new())
    } else {
        Err(NvmlError::Unknown(format!("NVML error code: {}", result)))
    }
}
