//! Power normalization

use crate::error::UnitError;
use crate::smi::document::PowerReadings;
use crate::smi::units::{parse_suffixed_scalar, Unit};
use crate::telemetry::{fixed2, percent, used_percent};

use serde::Serialize;

/// Parsed power section. Every reading is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPower {
    pub id: String,

    #[serde(serialize_with = "fixed2")]
    pub power_draw_w: f64,
    pub power_draw_humanized: String,

    #[serde(serialize_with = "fixed2")]
    pub current_power_limit_w: f64,
    pub current_power_limit_humanized: String,

    #[serde(serialize_with = "percent")]
    pub used_percent: Option<f64>,

    #[serde(serialize_with = "fixed2")]
    pub requested_power_limit_w: f64,
    pub requested_power_limit_humanized: String,

    #[serde(serialize_with = "fixed2")]
    pub default_power_limit_w: f64,
    pub default_power_limit_humanized: String,

    #[serde(serialize_with = "fixed2")]
    pub min_power_limit_w: f64,
    pub min_power_limit_humanized: String,

    #[serde(serialize_with = "fixed2")]
    pub max_power_limit_w: f64,
    pub max_power_limit_humanized: String,
}

fn watts(field: &'static str, value: &str) -> Result<f64, UnitError> {
    parse_suffixed_scalar(field, value, Unit::Watts)
}

impl PowerReadings {
    /// Parse the section, failing on the first reading that does not parse
    pub fn normalize(&self) -> Result<NormalizedPower, UnitError> {
        let draw = watts("power draw", &self.power_draw)?;
        let limit = watts("current power limit", &self.current_power_limit)?;

        Ok(NormalizedPower {
            id: self.id.clone(),
            power_draw_w: draw,
            power_draw_humanized: self.power_draw.clone(),
            current_power_limit_w: limit,
            current_power_limit_humanized: self.current_power_limit.clone(),
            used_percent: used_percent(draw, limit),
            requested_power_limit_w: watts("requested power limit", &self.requested_power_limit)?,
            requested_power_limit_humanized: self.requested_power_limit.clone(),
            default_power_limit_w: watts("default power limit", &self.default_power_limit)?,
            default_power_limit_humanized: self.default_power_limit.clone(),
            min_power_limit_w: watts("min power limit", &self.min_power_limit)?,
            min_power_limit_humanized: self.min_power_limit.clone(),
            max_power_limit_w: watts("max power limit", &self.max_power_limit)?,
            max_power_limit_humanized: self.max_power_limit.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h100() -> PowerReadings {
        PowerReadings {
            id: "GPU 00000000:53:00.0".to_string(),
            power_draw: "71.97 W".to_string(),
            current_power_limit: "700.00 W".to_string(),
            requested_power_limit: "700.00 W".to_string(),
            default_power_limit: "700.00 W".to_string(),
            min_power_limit: "200.00 W".to_string(),
            max_power_limit: "700.00 W".to_string(),
        }
    }

    #[test]
    fn test_normalize_power() {
        let power = h100().normalize().unwrap();
        assert!((power.power_draw_w - 71.97).abs() < 1e-9);
        assert_eq!(power.min_power_limit_w, 200.0);

        let json = serde_json::to_value(&power).unwrap();
        assert_eq!(json["power_draw_w"], "71.97");
        assert_eq!(json["current_power_limit_w"], "700.00");
        assert_eq!(json["used_percent"], "10.28");
        assert_eq!(json["power_draw_humanized"], "71.97 W");
    }

    #[test]
    fn test_any_limit_failure_aborts() {
        let mut raw = h100();
        raw.max_power_limit = "N/A".to_string();
        assert!(raw.normalize().unwrap_err().is_not_available());

        let mut raw = h100();
        raw.default_power_limit = "700.00".to_string();
        let err = raw.normalize().unwrap_err();
        assert!(err.to_string().contains("default power limit"));
    }

    #[test]
    fn test_zero_limit_reports_zero_percent() {
        let mut raw = h100();
        raw.current_power_limit = "0.00 W".to_string();
        let power = raw.normalize().unwrap();
        assert_eq!(power.used_percent, None);
    }
}
