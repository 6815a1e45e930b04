//! Cover component RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{EnergyCounters, SetConfigResponse, TemperatureReading};
use super::{decode_as, decode_empty};
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "cover",
    about: "RPCs related to cover components",
    requests: &[
        RequestDescriptor {
            method: "Cover.GetStatus",
            about: "Read the status of a cover component",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<CoverStatus>("Cover.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Cover.GetConfig",
            about: "Read the configuration of a cover component",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Cover.SetConfig",
            about: "Update the configuration of a cover component",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "config.name",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Human readable name of the cover",
                },
                FieldSpec {
                    path: "config.maxtime_open",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Maximum time in seconds for a full open run",
                },
                FieldSpec {
                    path: "config.maxtime_close",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Maximum time in seconds for a full close run",
                },
                FieldSpec {
                    path: "config.initial_state",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Position on power-on: open, closed, or stopped",
                },
                FieldSpec {
                    path: "config.invert_directions",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Swap the open and close motor directions",
                },
                FieldSpec {
                    path: "config.power_limit",
                    kind: FieldKind::Float,
                    nullable: true,
                    help: "Power threshold in watts above which the motor stops",
                },
                FieldSpec {
                    path: "config.obstruction_detection.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Stop and reverse when an obstruction is detected",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Cover.SetConfig", raw),
        },
        RequestDescriptor {
            method: "Cover.Open",
            about: "Open the cover fully",
            fields: &[ID_FIELD, DURATION_FIELD],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Cover.Close",
            about: "Close the cover fully",
            fields: &[ID_FIELD, DURATION_FIELD],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Cover.Stop",
            about: "Stop any ongoing cover movement",
            fields: &[ID_FIELD],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Cover.GoToPosition",
            about: "Move the cover to a position (requires calibration)",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "pos",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Target position: 0 is fully closed, 100 fully open",
                },
                FieldSpec {
                    path: "rel",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Relative move in percent; sign gives the direction",
                },
            ],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Cover.Calibrate",
            about: "Start the cover calibration procedure",
            fields: &[ID_FIELD],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Cover.ResetCounters",
            about: "Reset the energy counters of a cover component",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
    ],
};

const ID_FIELD: FieldSpec = FieldSpec {
    path: "id",
    kind: FieldKind::UInt,
    nullable: false,
    help: "Id of the cover component instance",
};

const DURATION_FIELD: FieldSpec = FieldSpec {
    path: "duration",
    kind: FieldKind::Float,
    nullable: false,
    help: "Move for this many seconds instead of a full run",
};

/// `Cover.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverStatus {
    pub id: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// One of open, closed, opening, closing, stopped, calibrating.
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apower: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,

    /// Present only when the cover is calibrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_pos: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_pos: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_control: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aenergy: Option<EnergyCounters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureReading>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn calibrated_status_carries_position() {
        let raw = json!({
            "id": 0,
            "state": "open",
            "current_pos": 100.0,
            "pos_control": true
        });
        let normalized = (COMPONENT.requests[0].decode)(raw).unwrap();
        assert_eq!(normalized["state"], json!("open"));
        assert_eq!(normalized["current_pos"], json!(100.0));
    }
}
