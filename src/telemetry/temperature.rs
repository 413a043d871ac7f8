//! Temperature normalization

use crate::error::UnitError;
use crate::smi::document::TemperatureReadings;
use crate::smi::units::{parse_suffixed_scalar, Unit};
use crate::telemetry::{fixed2, fixed2_or_empty, percent, used_percent};

use serde::Serialize;

/// Parsed temperature section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTemperature {
    pub id: String,

    pub current_humanized: String,
    #[serde(serialize_with = "fixed2")]
    pub current_celsius: f64,

    pub limit_humanized: String,
    #[serde(serialize_with = "fixed2_or_empty")]
    pub limit_celsius: Option<f64>,

    /// Against the explicit limit, else the shutdown, else the slowdown threshold
    #[serde(serialize_with = "percent")]
    pub used_percent: Option<f64>,

    pub shutdown_humanized: String,
    pub shutdown_limit: String,
    #[serde(serialize_with = "fixed2_or_empty")]
    pub shutdown_celsius: Option<f64>,

    pub slowdown_humanized: String,
    pub slowdown_limit: String,
    #[serde(serialize_with = "fixed2_or_empty")]
    pub slowdown_celsius: Option<f64>,

    pub max_operating_limit: String,

    pub target: String,
    pub memory_current: String,
    pub memory_max_operating_limit: String,
}

/// First of two readings that parses
fn either(
    primary: (&'static str, &str),
    secondary: (&'static str, &str),
) -> Result<f64, UnitError> {
    parse_suffixed_scalar(primary.0, primary.1, Unit::Celsius)
        .or_else(|_| parse_suffixed_scalar(secondary.0, secondary.1, Unit::Celsius))
}

impl TemperatureReadings {
    pub fn current_celsius(&self) -> Result<f64, UnitError> {
        parse_suffixed_scalar("GPU current temperature", &self.current, Unit::Celsius)
    }

    pub fn limit_celsius(&self) -> Result<f64, UnitError> {
        parse_suffixed_scalar("GPU t.limit temperature", &self.limit, Unit::Celsius)
    }

    /// Shutdown threshold, preferring the plain reading over the T.Limit one
    pub fn shutdown_celsius(&self) -> Result<f64, UnitError> {
        either(
            ("GPU shutdown temperature", &self.shutdown),
            ("GPU shutdown t.limit temperature", &self.shutdown_limit),
        )
    }

    /// Slowdown threshold, preferring the plain reading over the T.Limit one
    pub fn slowdown_celsius(&self) -> Result<f64, UnitError> {
        either(
            ("GPU slowdown temperature", &self.slowdown),
            ("GPU slowdown t.limit temperature", &self.slowdown_limit),
        )
    }

    /// Parse the section.
    ///
    /// The current temperature is mandatory. Every other reading is best
    /// effort and simply left out when it fails to parse.
    pub fn normalize(&self) -> Result<NormalizedTemperature, UnitError> {
        let current = self.current_celsius()?;

        let shutdown = self.shutdown_celsius().ok();
        let slowdown = self.slowdown_celsius().ok();
        let limit = self.limit_celsius().ok();

        let resolved_limit = match limit {
            Some(l) => l,
            None => [shutdown, slowdown]
                .into_iter()
                .flatten()
                .find(|v| *v > 0.0)
                .unwrap_or(0.0),
        };

        if limit.is_none() {
            log::debug!(
                "{}: temperature limit unavailable, using fallback {:.2}",
                self.id,
                resolved_limit
            );
        }

        Ok(NormalizedTemperature {
            id: self.id.clone(),
            current_humanized: self.current.clone(),
            current_celsius: current,
            limit_humanized: self.limit.clone(),
            limit_celsius: limit,
            used_percent: used_percent(current, resolved_limit),
            shutdown_humanized: self.shutdown.clone(),
            shutdown_limit: self.shutdown_limit.clone(),
            shutdown_celsius: shutdown,
            slowdown_humanized: self.slowdown.clone(),
            slowdown_limit: self.slowdown_limit.clone(),
            slowdown_celsius: slowdown,
            max_operating_limit: self.max_operating_limit.clone(),
            target: self.target.clone(),
            memory_current: self.memory_current.clone(),
            memory_max_operating_limit: self.memory_max_operating_limit.clone(),
        })
    }
}
