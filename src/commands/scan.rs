//! Scan command implementation
//!
//! Checks decoded tool output for hardware anomalies, then briefly listens
//! for a fault event. Hosts without the tool or the library skip the
//! corresponding check.

use crate::cli::args::{OutputFormat, ScanArgs};
use crate::cli::output::{print_output, ScanReport};
use crate::config::Config;
use crate::error::Result;
use crate::monitor::{DeviceMonitor, FaultEvent};
use crate::nvml::{GpuManager, NvmlManager};
use crate::smi::{Document, EccErrors, SmiCommand};

use std::time::Duration;

/// Execute the scan command
pub fn run_scan(args: &ScanArgs, format: OutputFormat, config: &Config) -> Result<()> {
    let mut report = ScanReport::default();

    let smi = SmiCommand::new(&config.smi);
    report.tool_present = smi.exists();
    if report.tool_present {
        let decoded = smi.fetch()?;
        report.decode_error = decoded.error.map(|e| e.to_string());
        scan_document(&mut report, &decoded.value);
    } else {
        log::info!("{} not found -- skipping GPU checks", config.smi.binary);
    }

    report.library_present = DeviceMonitor::<NvmlManager>::library_present();
    if !report.library_present {
        log::info!("NVML not found -- skipping event check");
    } else if args.event_wait > 0 {
        let monitor = DeviceMonitor::init(&config.monitor)?;
        report.event_wait_secs = args.event_wait;
        report.fault_event = wait_for_fault(&monitor, Duration::from_secs(args.event_wait))?;
    }

    print_output(&report, format)
}

/// Run every anomaly scan over a decoded document
pub fn scan_document(report: &mut ScanReport, doc: &Document) {
    report.gpu_errors = doc.find_gpu_errors();
    report.hw_slowdown_errors = doc.find_hw_slowdown_errors();

    let ecc: Vec<String> = doc
        .gpus
        .iter()
        .filter_map(|gpu| gpu.ecc_errors.as_ref())
        .filter_map(EccErrors::find_volatile_uncorrectable_errors)
        .flatten()
        .collect();
    report.ecc_errors = if ecc.is_empty() { None } else { Some(ecc) };
}

/// Start `monitor`, wait up to `wait` for the first fault event, then shut
/// it down.
pub fn wait_for_fault<M: GpuManager>(
    monitor: &DeviceMonitor<M>,
    wait: Duration,
) -> Result<Option<FaultEvent>> {
    let mut receiver = monitor.take_event_receiver()?;
    monitor.start()?;
    log::debug!("waiting {:?} for a fault event", wait);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let event = runtime.block_on(async {
        tokio::time::timeout(wait, receiver.recv())
            .await
            .ok()
            .flatten()
    });

    monitor.shutdown()?;
    Ok(event)
}
