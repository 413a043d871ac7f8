//! Snapshot command implementation
//!
//! Starts a monitor, queries every metric of every device once and prints
//! the result.

use crate::cli::args::OutputFormat;
use crate::cli::output::print_output;
use crate::config::Config;
use crate::error::{MonitorError, Partial, Result};
use crate::monitor::{DeviceMonitor, Snapshot};
use crate::nvml::GpuManager;

/// Execute the snapshot command
pub fn run_snapshot(format: OutputFormat, config: &Config) -> Result<()> {
    let monitor = DeviceMonitor::init(&config.monitor)?;
    let snapshot = take_snapshot(&monitor);
    monitor.shutdown()?;

    let partial = snapshot?;
    print_output(&partial.value, format)?;
    match partial.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Start `monitor` and collect one snapshot.
///
/// A failing metric query still yields the devices gathered before it.
pub fn take_snapshot<M: GpuManager>(
    monitor: &DeviceMonitor<M>,
) -> Result<Partial<Snapshot, MonitorError>> {
    monitor.start()?;
    let partial = monitor.get()?;
    if let Some(e) = &partial.error {
        log::warn!(
            "snapshot incomplete after {} device(s): {}",
            partial.value.device_infos.len(),
            e
        );
    }
    Ok(partial)
}
