//! Power domain types

use crate::telemetry::{percent, used_percent};

use serde::Serialize;

/// Power draw against the enforced limit, in milliwatts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Power {
    pub uuid: String,

    pub usage_milliwatts: u32,
    pub enforced_limit_milliwatts: u32,
    pub management_limit_milliwatts: u32,

    #[serde(serialize_with = "percent")]
    pub used_percent: Option<f64>,
}

impl Power {
    pub fn new(uuid: impl Into<String>, usage: u32, enforced_limit: u32, management_limit: u32) -> Self {
        Self {
            uuid: uuid.into(),
            usage_milliwatts: usage,
            enforced_limit_milliwatts: enforced_limit,
            management_limit_milliwatts: management_limit,
            used_percent: used_percent(usage as f64, enforced_limit as f64),
        }
    }

    /// Current draw in watts
    pub fn usage_watts(&self) -> f64 {
        self.usage_milliwatts as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_used_percent() {
        let power = Power::new("GPU-1", 350_000, 700_000, 700_000);
        assert_eq!(power.used_percent, Some(50.0));
        assert_eq!(power.usage_watts(), 350.0);
    }

    #[test]
    fn test_power_zero_limit() {
        let power = Power::new("GPU-1", 350_000, 0, 0);
        let json = serde_json::to_value(&power).unwrap();
        assert_eq!(json["used_percent"], "0.0");
    }
}
