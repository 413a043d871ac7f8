//! Mock implementations for testing
//!
//! Provides a mock manager, device and event set for exercising the monitor
//! without real hardware.

use crate::domain::{
    ClockEvents, ClockSpeed, DeviceAttributes, EccCounts, EccErrors, Memory, NvLink, NvLinkState,
    Power, Process, Processes, Temperature, ThermalThresholds, Utilization,
};
use crate::error::NvmlError;
use crate::nvml::{EventTypeMask, EventWaiter, GpuDevice, GpuManager, RawEvent};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock GPU device for testing
#[derive(Debug, Clone)]
pub struct MockDevice {
    index: u32,
    uuid: String,
    name: String,
    supported_events: EventTypeMask,
    registration: Result<(), NvmlError>,
    failing_query: Option<(&'static str, NvmlError)>,
    processes: Vec<(u32, u64)>,
}

impl MockDevice {
    /// Create a new mock device with default values
    pub fn new(index: u32) -> Self {
        Self {
            index,
            uuid: format!("GPU-MOCK-{:04}", index),
            name: format!("Mock GPU {}", index),
            supported_events: EventTypeMask::DEFAULT_INTEREST | EventTypeMask::PSTATE_CHANGE,
            registration: Ok(()),
            failing_query: None,
            processes: Vec::new(),
        }
    }

    /// Builder: set UUID
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Builder: set the event types the device reports as supported
    pub fn with_supported_events(mut self, mask: EventTypeMask) -> Self {
        self.supported_events = mask;
        self
    }

    /// Builder: event registration reports "not supported"
    pub fn with_registration_unsupported(self) -> Self {
        self.with_registration_error(NvmlError::NotSupported("mock".to_string()))
    }

    /// Builder: event registration fails with `err`
    pub fn with_registration_error(mut self, err: NvmlError) -> Self {
        self.registration = Err(err);
        self
    }

    /// Builder: the named metric query fails with `err`
    pub fn with_failing_query(mut self, query: &'static str, err: NvmlError) -> Self {
        self.failing_query = Some((query, err));
        self
    }

    /// Builder: running compute processes as `(pid, used bytes)`
    pub fn with_processes(mut self, processes: &[(u32, u64)]) -> Self {
        self.processes = processes.to_vec();
        self
    }

    fn check(&self, query: &'static str) -> Result<(), NvmlError> {
        match &self.failing_query {
            Some((name, err)) if *name == query => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl GpuDevice for MockDevice {
    fn uuid(&self) -> Result<String, NvmlError> {
        Ok(self.uuid.clone())
    }

    fn attributes(&self) -> Result<DeviceAttributes, NvmlError> {
        self.check("attributes")?;
        Ok(DeviceAttributes {
            minor_number: self.index,
            bus: 0x18 + self.index,
            device: 0,
            name: self.name.clone(),
            gpu_cores: 16896,
        })
    }

    fn supported_event_types(&self) -> Result<EventTypeMask, NvmlError> {
        Ok(self.supported_events)
    }

    fn clock_events(&self) -> Result<ClockEvents, NvmlError> {
        self.check("clock_events")?;
        Ok(ClockEvents::from_bits(self.uuid.clone(), 0x1))
    }

    fn clock_speed(&self) -> Result<ClockSpeed, NvmlError> {
        self.check("clock_speed")?;
        Ok(ClockSpeed {
            uuid: self.uuid.clone(),
            graphics_mhz: 1980,
            sm_mhz: 1980,
            memory_mhz: 2619,
            video_mhz: 1755,
        })
    }

    fn memory(&self) -> Result<Memory, NvmlError> {
        self.check("memory")?;
        Ok(Memory::new(self.uuid.clone(), 80 << 30, 20 << 30, 60 << 30))
    }

    fn nvlink(&self) -> Result<NvLink, NvmlError> {
        self.check("nvlink")?;
        Ok(NvLink {
            uuid: self.uuid.clone(),
            states: (0..2).map(|link| NvLinkState { link, active: true }).collect(),
        })
    }

    fn power(&self) -> Result<Power, NvmlError> {
        self.check("power")?;
        Ok(Power::new(self.uuid.clone(), 150_000, 700_000, 700_000))
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        self.check("temperature")?;
        Ok(Temperature::new(
            self.uuid.clone(),
            45,
            None,
            ThermalThresholds {
                shutdown: Some(92),
                slowdown: Some(89),
                mem_max: Some(95),
                gpu_max: Some(87),
            },
        ))
    }

    fn utilization(&self) -> Result<Utilization, NvmlError> {
        self.check("utilization")?;
        Ok(Utilization::new(self.uuid.clone(), 30, 10))
    }

    fn processes(&self) -> Result<Processes, NvmlError> {
        self.check("processes")?;
        Ok(Processes {
            uuid: self.uuid.clone(),
            running_processes: self
                .processes
                .iter()
                .map(|(pid, used)| Process::new(*pid, *used))
                .collect(),
        })
    }

    fn ecc_errors(&self) -> Result<EccErrors, NvmlError> {
        self.check("ecc_errors")?;
        Ok(EccErrors {
            uuid: self.uuid.clone(),
            supported: true,
            aggregate_total: EccCounts::default(),
            volatile_total: EccCounts::default(),
        })
    }
}

/// State shared between a mock manager and the test observing it
#[derive(Debug, Clone, Default)]
pub struct MockFlags {
    registered: Arc<Mutex<Vec<(String, EventTypeMask)>>>,
    events_released: Arc<AtomicBool>,
    library_shut_down: Arc<AtomicBool>,
}

impl MockFlags {
    /// Every registration attempt as `(uuid, mask)`, in order
    pub fn registered(&self) -> Vec<(String, EventTypeMask)> {
        self.registered.lock().unwrap().clone()
    }

    pub fn events_released(&self) -> bool {
        self.events_released.load(Ordering::SeqCst)
    }

    pub fn library_shut_down(&self) -> bool {
        self.library_shut_down.load(Ordering::SeqCst)
    }
}

type Script = Arc<Mutex<VecDeque<Result<RawEvent, NvmlError>>>>;

/// Mock event set replaying scripted wait results.
///
/// Once the script runs dry every wait times out.
#[derive(Debug)]
pub struct MockEvents {
    script: Script,
    flags: MockFlags,
    released: bool,
    panic_on_wait: bool,
}

impl EventWaiter for MockEvents {
    fn wait(&mut self, timeout: Duration) -> Result<RawEvent, NvmlError> {
        if self.released {
            return Err(NvmlError::NotInitialized);
        }
        if self.panic_on_wait {
            panic!("mock event set wait panicked");
        }
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
        Err(NvmlError::Timeout)
    }

    fn release(&mut self) -> Result<(), NvmlError> {
        self.released = true;
        self.flags.events_released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock GPU manager for testing
#[derive(Debug)]
pub struct MockManager {
    devices: Vec<MockDevice>,
    script: Script,
    flags: MockFlags,
    panic_on_wait: bool,
}

impl MockManager {
    /// Create a new mock manager with the given devices
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            script: Arc::default(),
            flags: MockFlags::default(),
            panic_on_wait: false,
        }
    }

    /// Builder: every wait on the event set panics
    pub fn with_panicking_wait(mut self) -> Self {
        self.panic_on_wait = true;
        self
    }

    /// Queue a result for the event set's next wait
    pub fn script_event(&self, result: Result<RawEvent, NvmlError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn flags(&self) -> MockFlags {
        self.flags.clone()
    }
}

impl GpuManager for MockManager {
    type Device = MockDevice;
    type Events = MockEvents;

    fn devices(&self) -> Result<Vec<Self::Device>, NvmlError> {
        Ok(self.devices.clone())
    }

    fn create_event_set(&self) -> Result<Self::Events, NvmlError> {
        Ok(MockEvents {
            script: Arc::clone(&self.script),
            flags: self.flags.clone(),
            released: false,
            panic_on_wait: self.panic_on_wait,
        })
    }

    fn register_events(
        &self,
        device: &Self::Device,
        mask: EventTypeMask,
        _events: &Self::Events,
    ) -> Result<(), NvmlError> {
        self.flags
            .registered
            .lock()
            .unwrap()
            .push((device.uuid.clone(), mask));
        device.registration.clone()
    }

    fn driver_version(&self) -> Result<String, NvmlError> {
        Ok("550.54.15".to_string())
    }

    fn shutdown(self) -> Result<(), NvmlError> {
        self.flags.library_shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}
