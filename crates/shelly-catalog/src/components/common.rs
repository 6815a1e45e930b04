//! Response fragments shared by several components.

use serde::{Deserialize, Serialize};

/// Accumulated energy counters reported by power-metering components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyCounters {
    /// Total energy in watt-hours since last reset.
    pub total: f64,

    /// Energy per minute for the last three minutes, most recent first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_minute: Option<Vec<f64>>,

    /// Unix timestamp of the start of `by_minute[0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute_ts: Option<i64>,
}

/// Internal temperature reading in both scales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureReading {
    #[serde(rename = "tC", default, skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f64>,

    #[serde(rename = "tF", default, skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Option<f64>,
}

/// Common shape of `*.SetConfig` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetConfigResponse {
    /// Whether the new configuration requires a device restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_required: Option<bool>,
}
