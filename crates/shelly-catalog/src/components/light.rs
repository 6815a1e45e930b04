//! Light component RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "light",
    about: "RPCs related to light components",
    requests: &[
        RequestDescriptor {
            method: "Light.GetStatus",
            about: "Read the status of a light component",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<LightStatus>("Light.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Light.GetConfig",
            about: "Read the configuration of a light component",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Light.SetConfig",
            about: "Update the configuration of a light component",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "config.name",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Human readable name of the light",
                },
                FieldSpec {
                    path: "config.initial_state",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "State on power-on: off, on, or restore_last",
                },
                FieldSpec {
                    path: "config.auto_on",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Turn the light on automatically after auto-on-delay",
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
                    help: "Turn the light off automatically after auto-off-delay",
                },
                FieldSpec {
                    path: "config.auto_off_delay",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Seconds to wait before the automatic off",
                },
                FieldSpec {
                    path: "config.default.brightness",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Brightness applied when turning on without a level",
                },
                FieldSpec {
                    path: "config.night_mode.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable night mode brightness limiting",
                },
                FieldSpec {
                    path: "config.night_mode.brightness",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Brightness cap while night mode is active",
                },
                FieldSpec {
                    path: "config.night_mode.active_between",
                    kind: FieldKind::StringList,
                    nullable: false,
                    help: "Night mode window as two HH:MM values",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Light.SetConfig", raw),
        },
        RequestDescriptor {
            method: "Light.Set",
            about: "Set the state of a light component",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "on",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Desired light state",
                },
                FieldSpec {
                    path: "brightness",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Brightness in percent",
                },
                FieldSpec {
                    path: "transition_duration",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Seconds over which to fade to the new state",
                },
                FieldSpec {
                    path: "toggle_after",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Flip the state back after this many seconds",
                },
            ],
            decode: super::decode_empty,
        },
        RequestDescriptor {
            method: "Light.Toggle",
            about: "Toggle a light component",
            fields: &[ID_FIELD],
            decode: super::decode_empty,
        },
    ],
};

const ID_FIELD: FieldSpec = FieldSpec {
    path: "id",
    kind: FieldKind::UInt,
    nullable: false,
    help: "Id of the light component instance",
};

/// `Light.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightStatus {
    pub id: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub output: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_started_at: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_duration: Option<f64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
