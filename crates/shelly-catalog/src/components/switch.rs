//! Switch component RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{EnergyCounters, SetConfigResponse, TemperatureReading};
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "switch",
    about: "RPCs related to switch components",
    requests: &[
        RequestDescriptor {
            method: "Switch.GetStatus",
            about: "Read the status of a switch component",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<SwitchStatus>("Switch.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Switch.GetConfig",
            about: "Read the configuration of a switch component",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<SwitchConfig>("Switch.GetConfig", raw),
        },
        RequestDescriptor {
            method: "Switch.SetConfig",
            about: "Update the configuration of a switch component",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "config.name",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Human readable name of the switch",
                },
                FieldSpec {
                    path: "config.in_mode",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Input mode: momentary, follow, flip, or detached",
                },
                FieldSpec {
                    path: "config.initial_state",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Output state on power-on: off, on, restore_last, or match_input",
                },
                FieldSpec {
                    path: "config.auto_on",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Turn the output on automatically after auto-on-delay",
                },
                FieldSpec {
                    path: "config.auto_on_delay",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Seconds to wait before the automatic on",
                },
                FieldSpec {
                    path: "config.auto_off",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Turn the output off automatically after auto-off-delay",
                },
                FieldSpec {
                    path: "config.auto_off_delay",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Seconds to wait before the automatic off",
                },
                FieldSpec {
                    path: "config.power_limit",
                    kind: FieldKind::Float,
                    nullable: true,
                    help: "Power threshold in watts above which the output turns off",
                },
                FieldSpec {
                    path: "config.voltage_limit",
                    kind: FieldKind::Float,
                    nullable: true,
                    help: "Voltage threshold above which the output turns off",
                },
                FieldSpec {
                    path: "config.current_limit",
                    kind: FieldKind::Float,
                    nullable: true,
                    help: "Current threshold in amperes above which the output turns off",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Switch.SetConfig", raw),
        },
        RequestDescriptor {
            method: "Switch.Set",
            about: "Set the output of a switch component",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "on",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Desired output state",
                },
                FieldSpec {
                    path: "toggle_after",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Flip the output back after this many seconds",
                },
            ],
            decode: |raw| decode_as::<SwitchSetResponse>("Switch.Set", raw),
        },
        RequestDescriptor {
            method: "Switch.Toggle",
            about: "Toggle the output of a switch component",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<SwitchSetResponse>("Switch.Toggle", raw),
        },
        RequestDescriptor {
            method: "Switch.ResetCounters",
            about: "Reset the energy counters of a switch component",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
    ],
};

const ID_FIELD: FieldSpec = FieldSpec {
    path: "id",
    kind: FieldKind::UInt,
    nullable: false,
    help: "Id of the switch component instance",
};

/// `Switch.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchStatus {
    pub id: u8,

    /// What caused the current output state (`"init"`, `"WS_in"`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub output: bool,

    /// Active power in watts, metered models only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apower: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aenergy: Option<EnergyCounters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureReading>,

    /// Active error conditions, e.g. `"overtemp"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_started_at: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_duration: Option<f64>,
}

/// `Switch.GetConfig` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub id: u8,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_on: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_on_delay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_off: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_off_delay: Option<f64>,

    #[serde(default)]
    pub power_limit: Option<f64>,

    #[serde(default)]
    pub voltage_limit: Option<f64>,

    #[serde(default)]
    pub current_limit: Option<f64>,

    /// Everything else the firmware reports that we do not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Response to `Switch.Set` and `Switch.Toggle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchSetResponse {
    /// Output state before the call took effect.
    pub was_on: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_decodes_metered_switch() {
        let raw = json!({
            "id": 0,
            "source": "WS_in",
            "output": true,
            "apower": 8.9,
            "voltage": 237.5,
            "current": 0.12,
            "aenergy": {"total": 6.532, "by_minute": [0.1, 0.1, 0.1], "minute_ts": 1700000000},
            "temperature": {"tC": 34.2, "tF": 93.6}
        });
        let normalized = (COMPONENT.requests[0].decode)(raw).unwrap();
        assert_eq!(normalized["output"], json!(true));
        assert_eq!(normalized["aenergy"]["total"], json!(6.532));
    }

    #[test]
    fn status_rejects_missing_output() {
        let raw = json!({"id": 0});
        assert!((COMPONENT.requests[0].decode)(raw).is_err());
    }
}
