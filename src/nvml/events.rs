//! Event types and the NVML event set
//!
//! `EventTypeMask` mirrors the library's `nvmlEventType*` bit values so masks
//! read from devices and masks written in configuration share one type.

use crate::error::NvmlError;
use crate::nvml::traits::EventWaiter;

use nvml_wrapper::enums::event::XidError;
use nvml_wrapper::EventSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::time::Duration;

/// Bitmask of NVML event types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTypeMask(u64);

impl EventTypeMask {
    pub const SINGLE_BIT_ECC_ERROR: Self = Self(0x0000_0001);
    pub const DOUBLE_BIT_ECC_ERROR: Self = Self(0x0000_0002);
    pub const PSTATE_CHANGE: Self = Self(0x0000_0004);
    pub const XID_CRITICAL_ERROR: Self = Self(0x0000_0008);
    pub const CLOCK_CHANGE: Self = Self(0x0000_0010);
    pub const POWER_SOURCE_CHANGE: Self = Self(0x0000_0080);
    pub const MIG_CONFIG_CHANGE: Self = Self(0x0000_0100);

    /// Fault classes the monitor registers for unless configured otherwise
    pub const DEFAULT_INTEREST: Self = Self(
        Self::XID_CRITICAL_ERROR.0 | Self::DOUBLE_BIT_ECC_ERROR.0 | Self::SINGLE_BIT_ECC_ERROR.0,
    );

    const NAMED: [(&'static str, EventTypeMask); 7] = [
        ("single_bit_ecc_error", Self::SINGLE_BIT_ECC_ERROR),
        ("double_bit_ecc_error", Self::DOUBLE_BIT_ECC_ERROR),
        ("pstate_change", Self::PSTATE_CHANGE),
        ("xid_critical_error", Self::XID_CRITICAL_ERROR),
        ("clock_change", Self::CLOCK_CHANGE),
        ("power_source_change", Self::POWER_SOURCE_CHANGE),
        ("mig_config_change", Self::MIG_CONFIG_CHANGE),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Look up a single event type by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, mask)| *mask)
    }

    /// Names of the known event types set in this mask
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, mask)| self.contains(*mask))
            .map(|(n, _)| *n)
            .collect()
    }
}

impl BitOr for EventTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for EventTypeMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for EventTypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "{:#x}", self.0)
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// One event as delivered by the wait primitive, before enrichment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub event_type: EventTypeMask,
    /// `None` when the event carries no Xid or the driver reports it as unknown
    pub xid: Option<u64>,
    pub device_uuid: Option<String>,
}

/// Owns an NVML event set until it is released
pub struct NvmlEvents {
    set: Option<EventSet<'static>>,
}

// SAFETY: the event set is only touched by one thread at a time. The monitor
// hands it to the event loop and takes it back when the loop exits, and NVML
// event sets are safe to wait on from any thread.
unsafe impl Send for NvmlEvents {}

impl NvmlEvents {
    pub(crate) fn new(set: EventSet<'static>) -> Self {
        Self { set: Some(set) }
    }

    /// Raw handle for registration calls the safe binding does not cover
    pub(crate) fn raw_handle(&self) -> Option<nvml_wrapper_sys::bindings::nvmlEventSet_t> {
        // SAFETY: the handle stays valid while `self.set` holds the set
        self.set.as_ref().map(|set| unsafe { set.handle() })
    }
}

impl EventWaiter for NvmlEvents {
    fn wait(&mut self, timeout: Duration) -> Result<RawEvent, NvmlError> {
        let set = self.set.as_ref().ok_or(NvmlError::NotInitialized)?;
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);

        let data = set.wait(millis)?;
        let xid = match data.event_data {
            Some(XidError::Value(code)) => Some(code),
            Some(XidError::Unknown) | None => None,
        };

        Ok(RawEvent {
            event_type: EventTypeMask::from_bits(data.event_type.bits()),
            xid,
            device_uuid: data.device.uuid().ok(),
        })
    }

    fn release(&mut self) -> Result<(), NvmlError> {
        match self.set.take() {
            Some(set) => set.release_events().map_err(NvmlError::from),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interest() {
        let mask = EventTypeMask::DEFAULT_INTEREST;
        assert_eq!(mask.bits(), 0xb);
        assert!(mask.contains(EventTypeMask::XID_CRITICAL_ERROR));
        assert!(!mask.contains(EventTypeMask::PSTATE_CHANGE));
        assert_eq!(
            mask.names(),
            vec!["single_bit_ecc_error", "double_bit_ecc_error", "xid_critical_error"]
        );
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            EventTypeMask::from_name("clock_change"),
            Some(EventTypeMask::CLOCK_CHANGE)
        );
        assert_eq!(EventTypeMask::from_name("Clock_Change"), None);
    }

    #[test]
    fn test_intersection_with_supported() {
        let supported = EventTypeMask::SINGLE_BIT_ECC_ERROR | EventTypeMask::PSTATE_CHANGE;
        let registered = EventTypeMask::DEFAULT_INTEREST & supported;
        assert_eq!(registered, EventTypeMask::SINGLE_BIT_ECC_ERROR);
        assert!((EventTypeMask::DEFAULT_INTEREST & EventTypeMask::PSTATE_CHANGE).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(EventTypeMask::XID_CRITICAL_ERROR.to_string(), "xid_critical_error");
        assert_eq!(EventTypeMask::from_bits(0x4000).to_string(), "0x4000");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&EventTypeMask::XID_CRITICAL_ERROR).unwrap();
        assert_eq!(json, "8");
    }
}
