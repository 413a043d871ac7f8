//! Integration tests for the device monitor with mock GPUs
//!
//! Run with `--features mock`.

use nvhealth::config::MonitorConfig;
use nvhealth::error::{MonitorError, NvmlError};
use nvhealth::mock::{MockDevice, MockManager};
use nvhealth::monitor::event::{MSG_KNOWN_XID, MSG_WAIT_FAILED};
use nvhealth::monitor::{DeviceMonitor, Lifecycle};
use nvhealth::nvml::{EventTypeMask, RawEvent};

use std::time::Duration;

fn config() -> MonitorConfig {
    MonitorConfig {
        wait_timeout_ms: 10,
        event_queue_capacity: 4,
        ..Default::default()
    }
}

#[test]
fn test_full_lifecycle() {
    let manager = MockManager::new(vec![
        MockDevice::new(0).with_processes(&[(u32::MAX, 1 << 30)]),
        MockDevice::new(1).with_registration_unsupported(),
    ]);
    let flags = manager.flags();
    manager.script_event(Ok(RawEvent {
        event_type: EventTypeMask::XID_CRITICAL_ERROR,
        xid: Some(48),
        device_uuid: Some("GPU-MOCK-0000".to_string()),
    }));
    manager.script_event(Err(NvmlError::GpuLost));

    let monitor = DeviceMonitor::new(manager, &config())
        .unwrap()
        .with_proc_root("/nonexistent-proc");
    let mut receiver = monitor.take_event_receiver().unwrap();
    assert_eq!(monitor.get().unwrap_err(), MonitorError::NotStarted);

    monitor.start().unwrap();
    assert_eq!(monitor.lifecycle().unwrap(), Lifecycle::Running);

    let snapshot = monitor.get().unwrap().into_result().unwrap();
    assert!(snapshot.exists);
    assert_eq!(snapshot.device_infos.len(), 2);
    assert!(snapshot.device_infos[0].error_supported);
    assert!(!snapshot.device_infos[1].error_supported);
    // The process vanished from the proc filesystem
    let procs = snapshot.device_infos[0].processes.as_ref().unwrap();
    assert!(procs.running_processes.is_empty());

    let first = receiver.blocking_recv().unwrap();
    assert_eq!(first.xid, 48);
    assert!(first.xid_critical_error);
    assert_eq!(first.message, MSG_KNOWN_XID);

    let second = receiver.blocking_recv().unwrap();
    assert_eq!(second.message, MSG_WAIT_FAILED);
    assert!(second.is_wait_failure());

    monitor.shutdown().unwrap();
    monitor.shutdown().unwrap();
    assert_eq!(monitor.lifecycle().unwrap(), Lifecycle::Shutdown);
    assert_eq!(monitor.get().unwrap_err(), MonitorError::NotInitialized);
    assert!(flags.events_released());
    assert!(flags.library_shut_down());

    // Every sender is gone after shutdown
    assert!(receiver.blocking_recv().is_none());
}

#[test]
fn test_event_loop_stops_within_timeout() {
    let manager = MockManager::new(vec![MockDevice::new(0)]);
    let monitor = DeviceMonitor::new(manager, &config()).unwrap();
    monitor.start().unwrap();

    let started = std::time::Instant::now();
    monitor.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}
