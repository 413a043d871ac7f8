//! Device monitor
//!
//! Owns the management library handle, registers every device for the
//! configured fault classes and republishes delivered events on a bounded
//! queue. Also answers synchronous per-device snapshot queries.
//!
//! Lifecycle: `new` (Initialized) -> `start` (Running) -> `shutdown`
//! (ShuttingDown, then Shutdown). Shutdown runs at most once; later calls and
//! the implicit call on drop return `Ok(())`.

pub mod event;
pub mod snapshot;
pub mod xid;

pub use event::FaultEvent;
pub use snapshot::{DeviceInfo, Snapshot};
pub use xid::XidDetail;

use crate::config::MonitorConfig;
use crate::domain::process::PROC_ROOT;
use crate::domain::DeviceAttributes;
use crate::error::{MonitorError, NvmlError, Partial};
use crate::nvml::{EventTypeMask, EventWaiter, GpuDevice, GpuManager, NvmlManager};

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, SendError};
use std::sync::{Mutex, Once, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const EVENT_THREAD_NAME: &str = "nvhealth-events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initialized,
    Running,
    ShuttingDown,
    Shutdown,
}

type TrackedDevices<D> = BTreeMap<String, TrackedDevice<D>>;

struct TrackedDevice<D> {
    device: D,
    attributes: DeviceAttributes,
    supported_events: EventTypeMask,
    error_supported: bool,
}

struct State<M: GpuManager> {
    lifecycle: Lifecycle,
    manager: Option<M>,
    /// Held here until `start` hands it to the event loop
    events: Mutex<Option<M::Events>>,
    devices: TrackedDevices<M::Device>,
    sender: Option<mpsc::Sender<FaultEvent>>,
    /// Yields `None` when `start` gave up before handing over the event set
    worker: Option<JoinHandle<Option<LoopExit<M::Events>>>>,
}

/// What the event loop thread hands back when it exits
struct LoopExit<W> {
    waiter: W,
    panicked: bool,
}

/// Live monitor over one management library handle
pub struct DeviceMonitor<M: GpuManager> {
    state: RwLock<State<M>>,
    receiver: Mutex<Option<mpsc::Receiver<FaultEvent>>>,
    cancel: watch::Sender<bool>,
    shutdown_guard: Once,

    interest: EventTypeMask,
    wait_timeout: Duration,
    library_message: String,
    proc_root: PathBuf,
}

impl DeviceMonitor<NvmlManager> {
    /// Initialize the management library and create a monitor over it
    pub fn init(config: &MonitorConfig) -> crate::Result<Self> {
        let manager = NvmlManager::new()?;
        Self::new(manager, config)
    }

    /// True when the management library can be loaded on this host
    pub fn library_present() -> bool {
        NvmlManager::library_available()
    }
}

impl<M: GpuManager> DeviceMonitor<M> {
    /// Create a monitor owning `manager`. Creates the (empty) event set.
    pub fn new(manager: M, config: &MonitorConfig) -> crate::Result<Self> {
        config.validate()?;
        let interest = config.interest_mask()?;

        let events = manager.create_event_set()?;
        let library_message = match manager.driver_version() {
            Ok(version) => format!("NVML found (driver {})", version),
            Err(e) => {
                log::warn!("failed to read driver version: {}", e);
                "NVML found".to_string()
            }
        };

        let (sender, receiver) = mpsc::channel(config.event_queue_capacity);
        let (cancel, _) = watch::channel(false);

        log::debug!(
            "monitor initialized (interest: {}, wait timeout: {:?})",
            interest,
            config.wait_timeout()
        );

        Ok(Self {
            state: RwLock::new(State {
                lifecycle: Lifecycle::Initialized,
                manager: Some(manager),
                events: Mutex::new(Some(events)),
                devices: BTreeMap::new(),
                sender: Some(sender),
                worker: None,
            }),
            receiver: Mutex::new(Some(receiver)),
            cancel,
            shutdown_guard: Once::new(),
            interest,
            wait_timeout: config.wait_timeout(),
            library_message,
            proc_root: PathBuf::from(PROC_ROOT),
        })
    }

    /// Read process command lines from another process filesystem root
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn lifecycle(&self) -> Result<Lifecycle, MonitorError> {
        Ok(self.read_state()?.lifecycle)
    }

    /// Enumerate devices, register them for events and launch the event loop.
    ///
    /// On failure the monitor stays `Initialized` with its event set and queue
    /// intact, so `start` may be retried and `shutdown` still releases both.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.write_state()?;
        match state.lifecycle {
            Lifecycle::Initialized => {}
            Lifecycle::Running => return Err(MonitorError::AlreadyStarted),
            Lifecycle::ShuttingDown | Lifecycle::Shutdown => {
                return Err(MonitorError::NotInitialized)
            }
        }

        // The thread idles until it receives the event set, so it is spawned
        // before anything is taken out of the state.
        let (handoff, handoff_rx) = sync_channel::<(M::Events, mpsc::Sender<FaultEvent>)>(1);
        let cancel = self.cancel.subscribe();
        let timeout = self.wait_timeout;
        let worker = thread::Builder::new()
            .name(EVENT_THREAD_NAME.to_string())
            .spawn(move || {
                let (mut waiter, sender) = handoff_rx.recv().ok()?;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_event_loop(&mut waiter, sender, cancel, timeout)
                }));
                Some(LoopExit {
                    waiter,
                    panicked: outcome.is_err(),
                })
            })
            .map_err(|e| MonitorError::EventLoop(e.to_string()))?;

        let st = &mut *state;
        let (waiter, sender, devices) = match self.prepare(st) {
            Ok(prepared) => prepared,
            Err(e) => {
                drop(handoff);
                if worker.join().is_err() {
                    log::warn!("idle event loop thread panicked");
                }
                return Err(e);
            }
        };

        if let Err(SendError((waiter, sender))) = handoff.send((waiter, sender)) {
            if let Ok(slot) = st.events.get_mut() {
                *slot = Some(waiter);
            }
            st.sender = Some(sender);
            if worker.join().is_err() {
                log::warn!("idle event loop thread panicked");
            }
            return Err(MonitorError::EventLoop(
                "event loop exited before start".to_string(),
            ));
        }

        log::info!("tracking {} device(s)", devices.len());
        st.devices = devices;
        st.worker = Some(worker);
        st.lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Take the event set and queue sender out of `st` and register every
    /// device. Leaves `st` untouched on error.
    fn prepare(
        &self,
        st: &mut State<M>,
    ) -> Result<
        (
            M::Events,
            mpsc::Sender<FaultEvent>,
            TrackedDevices<M::Device>,
        ),
        MonitorError,
    > {
        let manager = st.manager.as_ref().ok_or(MonitorError::NotInitialized)?;
        let slot = st.events.get_mut().map_err(|_| MonitorError::LockPoisoned)?;
        let waiter = slot.take().ok_or(MonitorError::NotInitialized)?;

        let sender = &mut st.sender;
        let registered = self.register_devices(manager, &waiter).and_then(|devices| {
            sender
                .take()
                .map(|sender| (sender, devices))
                .ok_or(MonitorError::NotInitialized)
        });

        match registered {
            Ok((sender, devices)) => Ok((waiter, sender, devices)),
            Err(e) => {
                *slot = Some(waiter);
                Err(e)
            }
        }
    }

    fn register_devices(
        &self,
        manager: &M,
        events: &M::Events,
    ) -> Result<TrackedDevices<M::Device>, MonitorError> {
        let mut tracked = BTreeMap::new();

        for device in manager.devices()? {
            let uuid = device.uuid()?;
            if uuid.is_empty() {
                return Err(MonitorError::EmptyUuid);
            }

            let attributes = device.attributes()?;
            let supported_events = device.supported_event_types()?;
            let mask = self.interest & supported_events;

            let error_supported = if mask.is_empty() {
                log::debug!("{}: supports none of the monitored event types", uuid);
                false
            } else {
                match manager.register_events(&device, mask, events) {
                    Ok(()) => {
                        log::debug!("{}: registered for {}", uuid, mask);
                        true
                    }
                    Err(NvmlError::NotSupported(msg)) => {
                        log::warn!("{}: event registration not supported: {}", uuid, msg);
                        false
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            tracked.insert(
                uuid,
                TrackedDevice {
                    device,
                    attributes,
                    supported_events,
                    error_supported,
                },
            );
        }

        Ok(tracked)
    }

    /// Hand out the fault event stream. Only one receiver exists.
    pub fn take_event_receiver(&self) -> Result<mpsc::Receiver<FaultEvent>, MonitorError> {
        if matches!(
            self.lifecycle()?,
            Lifecycle::ShuttingDown | Lifecycle::Shutdown
        ) {
            return Err(MonitorError::NotInitialized);
        }

        self.receiver
            .lock()
            .map_err(|_| MonitorError::LockPoisoned)?
            .take()
            .ok_or(MonitorError::EventStreamTaken)
    }

    /// Query every metric class of every device.
    ///
    /// The first failing query stops collection; the devices gathered so far
    /// (including the partially filled one) come back with the error.
    pub fn get(&self) -> Result<Partial<Snapshot, MonitorError>, MonitorError> {
        let state = self.read_state()?;
        match state.lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Initialized => return Err(MonitorError::NotStarted),
            Lifecycle::ShuttingDown | Lifecycle::Shutdown => {
                return Err(MonitorError::NotInitialized)
            }
        }

        let mut snapshot = Snapshot {
            exists: true,
            message: self.library_message.clone(),
            device_infos: Vec::with_capacity(state.devices.len()),
        };

        for (uuid, tracked) in &state.devices {
            let mut info = DeviceInfo::new(
                uuid.as_str(),
                &tracked.attributes,
                tracked.supported_events,
                tracked.error_supported,
            );
            let collected = info.collect(&tracked.device, &self.proc_root);
            snapshot.device_infos.push(info);

            if let Err(e) = collected {
                log::warn!("{}: snapshot query failed: {}", uuid, e);
                return Ok(Partial::degraded(snapshot, e.into()));
            }
        }

        Ok(Partial::complete(snapshot))
    }

    /// Stop the event loop and release every native handle.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub fn shutdown(&self) -> Result<(), MonitorError> {
        let mut result = Ok(());
        self.shutdown_guard
            .call_once(|| result = self.shutdown_once());
        result
    }

    fn shutdown_once(&self) -> Result<(), MonitorError> {
        let worker = {
            let mut state = self.write_state()?;
            state.lifecycle = Lifecycle::ShuttingDown;
            state.worker.take()
        };

        self.cancel.send_replace(true);

        // The loop may be blocked in a wait; joining takes up to one timeout.
        let mut first_error = None;
        let returned = match worker.map(JoinHandle::join) {
            Some(Ok(Some(exit))) => {
                if exit.panicked {
                    log::error!("event loop panicked");
                    first_error = Some(MonitorError::EventLoop("event loop panicked".to_string()));
                }
                Some(exit.waiter)
            }
            Some(Err(_)) => {
                log::error!("event loop thread panicked outside the loop");
                first_error = Some(MonitorError::EventLoop("event loop panicked".to_string()));
                None
            }
            Some(Ok(None)) | None => None,
        };

        let mut state = self.write_state()?;
        let parked = state
            .events
            .get_mut()
            .map_err(|_| MonitorError::LockPoisoned)?
            .take();
        if let Some(mut waiter) = returned.or(parked) {
            if let Err(e) = waiter.release() {
                log::warn!("failed to release event set: {}", e);
                first_error.get_or_insert(e.into());
            }
        }

        state.devices.clear();
        state.sender = None;

        if let Some(manager) = state.manager.take() {
            if let Err(e) = manager.shutdown() {
                log::warn!("failed to shut down NVML: {}", e);
                first_error.get_or_insert(e.into());
            }
        }

        state.lifecycle = Lifecycle::Shutdown;
        log::debug!("monitor shut down");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State<M>>, MonitorError> {
        self.state.read().map_err(|_| MonitorError::LockPoisoned)
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, State<M>>, MonitorError> {
        self.state.write().map_err(|_| MonitorError::LockPoisoned)
    }
}

impl<M: GpuManager> Drop for DeviceMonitor<M> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("monitor shutdown on drop failed: {}", e);
        }
    }
}

/// Wait for events until cancelled, publishing each onto `sender`.
///
/// The waiter stays with the caller, which releases it.
fn run_event_loop<W: EventWaiter>(
    waiter: &mut W,
    sender: mpsc::Sender<FaultEvent>,
    mut cancel: watch::Receiver<bool>,
    timeout: Duration,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to build event loop runtime: {}", e);
            return;
        }
    };

    log::debug!("polling xid events");
    loop {
        if *cancel.borrow() {
            break;
        }

        let event = match waiter.wait(timeout) {
            Ok(raw) => FaultEvent::from_raw(raw),
            Err(NvmlError::Timeout) => {
                log::debug!("no event found in wait (timeout) -- retrying...");
                continue;
            }
            Err(e) => {
                log::warn!("event set wait failed: {}", e);
                FaultEvent::wait_failed(&e)
            }
        };

        if !event.is_wait_failure() && event.detail.is_none() {
            log::info!("received event with unknown xid {}", event.xid);
        }

        let published = runtime.block_on(async {
            tokio::select! {
                biased;
                _ = cancel.wait_for(|cancelled| *cancelled) => false,
                sent = sender.send(event) => {
                    if sent.is_err() {
                        log::debug!("fault event receiver dropped");
                    }
                    true
                }
            }
        });
        if !published {
            break;
        }
    }

    log::debug!("event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockManager};
    use crate::nvml::RawEvent;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            wait_timeout_ms: 10,
            ..Default::default()
        }
    }

    fn monitor_with(manager: MockManager) -> DeviceMonitor<MockManager> {
        let root = std::env::temp_dir().join("nvhealth-no-such-proc");
        DeviceMonitor::new(manager, &fast_config())
            .unwrap()
            .with_proc_root(root)
    }

    fn critical(xid: u64) -> RawEvent {
        RawEvent {
            event_type: EventTypeMask::XID_CRITICAL_ERROR,
            xid: Some(xid),
            device_uuid: Some("GPU-MOCK-0000".to_string()),
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<FaultEvent>) -> FaultEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event within 5s")
            .expect("channel closed")
    }

    #[test]
    fn test_shutdown_twice_is_ok() {
        let monitor = monitor_with(MockManager::new(vec![MockDevice::new(0)]));
        monitor.start().unwrap();
        assert!(monitor.shutdown().is_ok());
        assert!(monitor.shutdown().is_ok());
        assert_eq!(monitor.lifecycle().unwrap(), Lifecycle::Shutdown);
    }

    #[test]
    fn test_shutdown_without_start() {
        let manager = MockManager::new(vec![MockDevice::new(0)]);
        let flags = manager.flags();
        let monitor = monitor_with(manager);
        monitor.shutdown().unwrap();
        assert!(flags.events_released());
        assert!(flags.library_shut_down());
    }

    #[test]
    fn test_queries_after_shutdown_not_initialized() {
        let monitor = monitor_with(MockManager::new(vec![MockDevice::new(0)]));
        monitor.start().unwrap();
        monitor.shutdown().unwrap();

        assert_eq!(monitor.get().unwrap_err(), MonitorError::NotInitialized);
        assert_eq!(monitor.start().unwrap_err(), MonitorError::NotInitialized);
        assert_eq!(
            monitor.take_event_receiver().unwrap_err(),
            MonitorError::NotInitialized
        );
    }

    #[test]
    fn test_get_before_start() {
        let monitor = monitor_with(MockManager::new(vec![MockDevice::new(0)]));
        assert_eq!(monitor.get().unwrap_err(), MonitorError::NotStarted);
    }

    #[test]
    fn test_double_start() {
        let monitor = monitor_with(MockManager::new(vec![MockDevice::new(0)]));
        monitor.start().unwrap();
        assert_eq!(monitor.start().unwrap_err(), MonitorError::AlreadyStarted);
    }

    #[test]
    fn test_receiver_taken_once() {
        let monitor = monitor_with(MockManager::new(vec![]));
        assert!(monitor.take_event_receiver().is_ok());
        assert_eq!(
            monitor.take_event_receiver().unwrap_err(),
            MonitorError::EventStreamTaken
        );
    }

    #[test]
    fn test_empty_uuid_rejected() {
        let monitor = monitor_with(MockManager::new(vec![MockDevice::new(0).with_uuid("")]));
        assert_eq!(monitor.start().unwrap_err(), MonitorError::EmptyUuid);
    }

    #[test]
    fn test_registration_intersects_supported_events() {
        let manager = MockManager::new(vec![
            MockDevice::new(0),
            MockDevice::new(1).with_supported_events(EventTypeMask::PSTATE_CHANGE),
            MockDevice::new(2).with_registration_unsupported(),
        ]);
        let flags = manager.flags();
        let monitor = monitor_with(manager);
        monitor.start().unwrap();

        assert_eq!(
            flags.registered(),
            vec![
                ("GPU-MOCK-0000".to_string(), EventTypeMask::DEFAULT_INTEREST),
                (
                    "GPU-MOCK-0002".to_string(),
                    EventTypeMask::DEFAULT_INTEREST
                ),
            ]
        );

        let snapshot = monitor.get().unwrap().into_result().unwrap();
        let supported: Vec<bool> = snapshot
            .device_infos
            .iter()
            .map(|d| d.error_supported)
            .collect();
        assert_eq!(supported, vec![true, false, false]);
    }

    #[test]
    fn test_registration_failure_aborts_start() {
        let monitor = monitor_with(MockManager::new(vec![
            MockDevice::new(0).with_registration_error(NvmlError::GpuLost)
        ]));
        assert_eq!(
            monitor.start().unwrap_err(),
            MonitorError::Nvml(NvmlError::GpuLost)
        );
    }

    #[test]
    fn test_failed_start_can_retry_and_shut_down() {
        let manager = MockManager::new(vec![
            MockDevice::new(0),
            MockDevice::new(1).with_registration_error(NvmlError::GpuLost),
        ]);
        let flags = manager.flags();
        let monitor = monitor_with(manager);

        assert_eq!(
            monitor.start().unwrap_err(),
            MonitorError::Nvml(NvmlError::GpuLost)
        );
        assert_eq!(monitor.lifecycle().unwrap(), Lifecycle::Initialized);
        assert_eq!(monitor.get().unwrap_err(), MonitorError::NotStarted);

        // The event set and queue survived, so a retry hits the same device error
        assert_eq!(
            monitor.start().unwrap_err(),
            MonitorError::Nvml(NvmlError::GpuLost)
        );
        assert!(monitor.take_event_receiver().is_ok());

        monitor.shutdown().unwrap();
        assert!(flags.events_released());
        assert!(flags.library_shut_down());
        assert_eq!(monitor.lifecycle().unwrap(), Lifecycle::Shutdown);
        assert_eq!(monitor.start().unwrap_err(), MonitorError::NotInitialized);
        assert_eq!(monitor.get().unwrap_err(), MonitorError::NotInitialized);
    }

    #[test]
    fn test_panicking_event_loop_still_releases() {
        let manager = MockManager::new(vec![MockDevice::new(0)]).with_panicking_wait();
        let flags = manager.flags();
        let monitor = monitor_with(manager);
        let mut rx = monitor.take_event_receiver().unwrap();
        monitor.start().unwrap();

        // The queue closes once the panicking loop drops its sender
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let closed = runtime.block_on(async {
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await
        });
        assert_eq!(closed.unwrap(), None);

        assert!(matches!(
            monitor.shutdown().unwrap_err(),
            MonitorError::EventLoop(_)
        ));
        assert!(flags.events_released());
        assert!(flags.library_shut_down());
        assert_eq!(monitor.lifecycle().unwrap(), Lifecycle::Shutdown);
        assert!(monitor.shutdown().is_ok());
    }

    #[test]
    fn test_get_sorted_by_uuid() {
        let monitor = monitor_with(MockManager::new(vec![
            MockDevice::new(0).with_uuid("GPU-c"),
            MockDevice::new(1).with_uuid("GPU-a"),
            MockDevice::new(2).with_uuid("GPU-b"),
        ]));
        monitor.start().unwrap();

        let partial = monitor.get().unwrap();
        assert!(partial.is_complete());
        let uuids: Vec<&str> = partial
            .value
            .device_infos
            .iter()
            .map(|d| d.uuid.as_str())
            .collect();
        assert_eq!(uuids, vec!["GPU-a", "GPU-b", "GPU-c"]);
        assert!(partial.value.device_infos.iter().all(DeviceInfo::is_complete));
        assert!(partial.value.exists);
    }

    #[test]
    fn test_get_returns_partial_on_first_failure() {
        let monitor = monitor_with(MockManager::new(vec![
            MockDevice::new(0).with_uuid("GPU-a"),
            MockDevice::new(1)
                .with_uuid("GPU-b")
                .with_failing_query("power", NvmlError::GpuLost),
            MockDevice::new(2).with_uuid("GPU-c"),
        ]));
        monitor.start().unwrap();

        let partial = monitor.get().unwrap();
        assert_eq!(partial.error, Some(MonitorError::Nvml(NvmlError::GpuLost)));

        let infos = &partial.value.device_infos;
        assert_eq!(infos.len(), 2);
        assert!(infos[0].is_complete());
        assert_eq!(infos[1].uuid, "GPU-b");
        assert!(infos[1].nvlink.is_some());
        assert!(infos[1].power.is_none());
        assert!(infos[1].temperature.is_none());
    }

    #[test]
    fn test_get_skips_exited_processes() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("100");
        std::fs::create_dir(&live).unwrap();
        std::fs::write(live.join("cmdline"), b"/usr/bin/python3\0serve.py\0").unwrap();

        let monitor = DeviceMonitor::new(
            MockManager::new(vec![MockDevice::new(0).with_processes(&[(100, 1 << 30), (200, 1 << 20)])]),
            &fast_config(),
        )
        .unwrap()
        .with_proc_root(root.path());
        monitor.start().unwrap();

        let snapshot = monitor.get().unwrap().into_result().unwrap();
        let procs = snapshot.device_infos[0].processes.as_ref().unwrap();
        assert_eq!(procs.running_processes.len(), 1);
        assert_eq!(procs.running_processes[0].cmd_args, vec!["/usr/bin/python3", "serve.py"]);
    }

    #[tokio::test]
    async fn test_known_critical_event_published() {
        let manager = MockManager::new(vec![MockDevice::new(0)]);
        manager.script_event(Ok(critical(79)));
        let monitor = monitor_with(manager);
        let mut rx = monitor.take_event_receiver().unwrap();
        monitor.start().unwrap();

        let ev = next_event(&mut rx).await;
        assert_eq!(ev.xid, 79);
        assert!(ev.xid_critical_error);
        assert_eq!(ev.message, event::MSG_KNOWN_XID);
        assert_eq!(ev.detail.map(|d| d.code), Some(79));
        assert_eq!(ev.uuid.as_deref(), Some("GPU-MOCK-0000"));

        monitor.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_timeouts_produce_no_events() {
        let manager = MockManager::new(vec![MockDevice::new(0)]);
        for _ in 0..5 {
            manager.script_event(Err(NvmlError::Timeout));
        }
        manager.script_event(Ok(critical(4242)));
        let monitor = monitor_with(manager);
        let mut rx = monitor.take_event_receiver().unwrap();
        monitor.start().unwrap();

        // The first event out is the one after the timeouts
        let ev = next_event(&mut rx).await;
        assert_eq!(ev.xid, 4242);
        assert_eq!(ev.message, event::MSG_UNKNOWN_XID);
        assert!(ev.detail.is_none());

        monitor.shutdown().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_failure_published_and_loop_continues() {
        let manager = MockManager::new(vec![MockDevice::new(0)]);
        manager.script_event(Err(NvmlError::Unknown("driver hiccup".to_string())));
        manager.script_event(Ok(critical(48)));
        let monitor = monitor_with(manager);
        let mut rx = monitor.take_event_receiver().unwrap();
        monitor.start().unwrap();

        let failed = next_event(&mut rx).await;
        assert!(failed.is_wait_failure());
        assert_eq!(failed.xid, 0);
        assert_eq!(failed.message, event::MSG_WAIT_FAILED);
        assert!(failed.error.unwrap().contains("driver hiccup"));

        let ev = next_event(&mut rx).await;
        assert_eq!(ev.xid, 48);

        monitor.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_with_full_queue() {
        let manager = MockManager::new(vec![MockDevice::new(0)]);
        for _ in 0..4 {
            manager.script_event(Ok(critical(13)));
        }
        let flags = manager.flags();
        let config = MonitorConfig {
            wait_timeout_ms: 10,
            event_queue_capacity: 1,
            ..Default::default()
        };
        let monitor = DeviceMonitor::new(manager, &config).unwrap();
        let _rx = monitor.take_event_receiver().unwrap();
        monitor.start().unwrap();

        // Give the loop time to fill the queue and block on publish
        tokio::time::sleep(Duration::from_millis(50)).await;

        monitor.shutdown().unwrap();
        assert!(flags.events_released());
        assert!(flags.library_shut_down());
    }

    #[test]
    fn test_drop_shuts_down() {
        let manager = MockManager::new(vec![MockDevice::new(0)]);
        let flags = manager.flags();
        {
            let monitor = monitor_with(manager);
            monitor.start().unwrap();
        }
        assert!(flags.events_released());
        assert!(flags.library_shut_down());
    }
}
