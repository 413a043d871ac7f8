//! Typed telemetry derived from the tool's display strings
//!
//! Each normalized reading keeps the original humanized string next to the
//! parsed number. Numbers are typed in memory and serialize to the fixed
//! two-decimal strings downstream consumers read.

pub mod memory;
pub mod power;
pub mod temperature;

pub use memory::NormalizedMemory;
pub use power::NormalizedPower;
pub use temperature::NormalizedTemperature;

use serde::Serializer;

/// Percentage reported when no usable limit exists
pub const UNAVAILABLE_PERCENT: &str = "0.0";

/// `current / limit * 100`, only when the limit is positive
pub fn used_percent(current: f64, limit: f64) -> Option<f64> {
    if limit > 0.0 {
        Some(current / limit * 100.0)
    } else {
        None
    }
}

pub(crate) fn fixed2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.2}", value))
}

/// Absent values serialize as an empty string
pub(crate) fn fixed2_or_empty<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => fixed2(v, serializer),
        None => serializer.serialize_str(""),
    }
}

pub(crate) fn percent<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => fixed2(v, serializer),
        None => serializer.serialize_str(UNAVAILABLE_PERCENT),
    }
}
