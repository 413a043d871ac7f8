//! Unit-suffixed value parsing
//!
//! The tool prints most readings as display strings such as `"75 C"`,
//! `"42.31 W"` or `"80536 MiB"`, with `"N/A"` standing in for readings the
//! device does not provide. These helpers turn them into numbers while keeping
//! "absent" and "malformed" apart.

use crate::error::UnitError;

use humansize::{format_size, DECIMAL};

/// Literal the tool prints for unavailable readings
pub const NOT_AVAILABLE: &str = "N/A";

/// Unit suffix expected on a scalar reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Watts,
}

impl Unit {
    /// The display suffix, including its leading space
    pub const fn suffix(self) -> &'static str {
        match self {
            Unit::Celsius => " C",
            Unit::Watts => " W",
        }
    }

    /// Unit name used in format errors
    pub const fn name(self) -> &'static str {
        match self {
            Unit::Celsius => "celsius",
            Unit::Watts => "watts",
        }
    }
}

/// Parse a scalar such as `"75 C"` into `75.0`.
///
/// `"N/A"` yields [`UnitError::NotAvailable`]. Anything else must end with
/// exactly the unit suffix, otherwise [`UnitError::InvalidFormat`] names the
/// offending `field`.
pub fn parse_suffixed_scalar(field: &'static str, value: &str, unit: Unit) -> Result<f64, UnitError> {
    if value == NOT_AVAILABLE {
        return Err(UnitError::NotAvailable);
    }

    let number = value
        .strip_suffix(unit.suffix())
        .ok_or_else(|| UnitError::InvalidFormat {
            field,
            value: value.to_string(),
            expected: unit.name(),
        })?;

    Ok(number.parse::<f64>()?)
}

/// Multiplier for a lower-cased byte unit, SI and IEC alike
fn byte_multiplier(unit: &str) -> Option<f64> {
    const KI: f64 = 1024.0;
    const K: f64 = 1000.0;
    let m = match unit {
        "" | "b" => 1.0,
        "k" | "kb" => K,
        "ki" | "kib" => KI,
        "m" | "mb" => K.powi(2),
        "mi" | "mib" => KI.powi(2),
        "g" | "gb" => K.powi(3),
        "gi" | "gib" => KI.powi(3),
        "t" | "tb" => K.powi(4),
        "ti" | "tib" => KI.powi(4),
        "p" | "pb" => K.powi(5),
        "pi" | "pib" => KI.powi(5),
        "e" | "eb" => K.powi(6),
        "ei" | "eib" => KI.powi(6),
        _ => return None,
    };
    Some(m)
}

/// Parse a human-readable byte size such as `"80536 MiB"` or `"84.45 GB"`.
///
/// Units are case-insensitive; digit-group commas are ignored.
pub fn parse_bytes(value: &str) -> Result<u64, UnitError> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let number: String = number.chars().filter(|c| *c != ',').collect();
    let number: f64 = number
        .parse()
        .map_err(|_| UnitError::InvalidByteSize(value.to_string()))?;

    let multiplier = byte_multiplier(&unit.trim().to_ascii_lowercase())
        .ok_or_else(|| UnitError::InvalidByteSize(value.to_string()))?;

    let bytes = (number * multiplier).round();
    if bytes >= u64::MAX as f64 {
        return Err(UnitError::InvalidByteSize(value.to_string()));
    }
    Ok(bytes as u64)
}

/// Canonical humanized form of a byte count (SI units, two decimals)
pub fn humanize_bytes(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}
