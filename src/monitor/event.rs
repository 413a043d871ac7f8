//! Fault events republished by the monitor

use crate::error::{AppError, NvmlError};
use crate::monitor::xid::{self, XidDetail};
use crate::nvml::{EventTypeMask, RawEvent};

use serde::Serialize;

pub const MSG_KNOWN_XID: &str = "received event with a known xid";
pub const MSG_UNKNOWN_XID: &str = "received event but xid unknown";
pub const MSG_WAIT_FAILED: &str = "event set wait returned non-success";

/// One hardware fault notification, or a failure of the wait itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultEvent {
    pub event_type: EventTypeMask,

    pub xid: u64,
    pub xid_critical_error: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<XidDetail>,

    /// Device the event was delivered for, when the driver names one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Set when the wait primitive failed; no fault code in that case
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FaultEvent {
    /// Enrich an event from the wait primitive
    pub fn from_raw(raw: RawEvent) -> Self {
        let code = raw.xid.unwrap_or(0);
        let detail = if code > 0 { xid::lookup(code).cloned() } else { None };
        let message = if detail.is_some() {
            MSG_KNOWN_XID
        } else {
            MSG_UNKNOWN_XID
        };

        Self {
            event_type: raw.event_type,
            xid: code,
            xid_critical_error: raw.event_type == EventTypeMask::XID_CRITICAL_ERROR,
            detail,
            uuid: raw.device_uuid,
            message: message.to_string(),
            error: None,
        }
    }

    /// The wait itself failed
    pub fn wait_failed(err: &NvmlError) -> Self {
        Self {
            event_type: EventTypeMask::empty(),
            xid: 0,
            xid_critical_error: false,
            detail: None,
            uuid: None,
            message: MSG_WAIT_FAILED.to_string(),
            error: Some(format!("event set wait failed: {}", err)),
        }
    }

    pub fn is_wait_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string_pretty(self).map_err(AppError::from)
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(self).map_err(AppError::from)
    }
}
