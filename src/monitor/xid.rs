//! Static Xid detail table
//!
//! Xids are driver-reported fault codes. The table covers the codes seen in
//! practice on datacenter parts; anything else is reported without detail.

use serde::Serialize;

/// What to do about a fault, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing beyond recording it
    None,
    /// Restart the application that triggered it
    RestartApplication,
    /// Reset the GPU (or reload the driver)
    ResetGpu,
    /// Reboot the host
    RebootSystem,
    /// Open a hardware ticket
    HardwareInspection,
}

/// Detail record for one Xid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XidDetail {
    pub code: u64,
    pub name: &'static str,
    pub description: &'static str,
    /// Usually requires remediation beyond the faulting process
    pub critical: bool,
    pub action: Action,
}

const fn detail(
    code: u64,
    name: &'static str,
    description: &'static str,
    critical: bool,
    action: Action,
) -> XidDetail {
    XidDetail {
        code,
        name,
        description,
        critical,
        action,
    }
}

static DETAILS: &[XidDetail] = &[
    detail(8, "GPU stopped processing", "Driver error or system memory corruption stalled the GPU", true, Action::ResetGpu),
    detail(13, "Graphics Engine Exception", "Out-of-range memory access or illegal instruction in user code", false, Action::RestartApplication),
    detail(31, "GPU memory page fault", "Application attempted an illegal memory address access", false, Action::RestartApplication),
    detail(32, "Invalid or corrupted push buffer stream", "DMA controller reported a corrupted push buffer, often a PCIe error", true, Action::HardwareInspection),
    detail(38, "Driver firmware error", "Firmware returned an unexpected error", true, Action::ResetGpu),
    detail(43, "GPU stopped processing", "Application hit a software induced fault and the channel was torn down", false, Action::None),
    detail(45, "Preemptive cleanup, due to previous errors", "Channels were shut down after an earlier fault or a process was killed", false, Action::None),
    detail(48, "Double Bit ECC Error", "Uncorrectable ECC error in GPU memory", true, Action::ResetGpu),
    detail(61, "Internal micro-controller breakpoint/warning", "PMU halted on an internal breakpoint", true, Action::ResetGpu),
    detail(62, "Internal micro-controller halt", "PMU halted unexpectedly", true, Action::ResetGpu),
    detail(63, "ECC page retirement or row remapping recording event", "A page retirement or row remap was recorded", false, Action::None),
    detail(64, "ECC page retirement or row remapper recording failure", "Recording a page retirement or row remap failed", true, Action::ResetGpu),
    detail(68, "NVDEC0 Exception", "Video decoder engine fault", false, Action::RestartApplication),
    detail(69, "Graphics Engine class error", "Invalid class or method issued to the graphics engine", false, Action::RestartApplication),
    detail(74, "NVLINK Error", "NVLink error detected on one or more links", true, Action::ResetGpu),
    detail(79, "GPU has fallen off the bus", "The GPU is no longer reachable over PCIe", true, Action::RebootSystem),
    detail(92, "High single-bit ECC error rate", "Correctable ECC errors exceeded the rate threshold", false, Action::None),
    detail(94, "Contained ECC error", "Uncorrectable ECC error contained to the affected application", false, Action::RestartApplication),
    detail(95, "Uncontained ECC error", "Uncorrectable ECC error could not be contained; all applications are affected", true, Action::ResetGpu),
    detail(119, "GSP RPC Timeout", "GPU System Processor did not answer a driver request in time", true, Action::ResetGpu),
    detail(120, "GSP Error", "GPU System Processor reported an internal error", true, Action::ResetGpu),
];

/// Look up the detail record for an Xid
pub fn lookup(code: u64) -> Option<&'static XidDetail> {
    DETAILS.iter().find(|d| d.code == code)
}

/// Every Xid with a detail record
pub fn all() -> &'static [XidDetail] {
    DETAILS
}
