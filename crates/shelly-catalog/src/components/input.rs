//! Input component RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "input",
    about: "RPCs related to input components",
    requests: &[
        RequestDescriptor {
            method: "Input.GetStatus",
            about: "Read the status of an input component",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<InputStatus>("Input.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Input.GetConfig",
            about: "Read the configuration of an input component",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Input.SetConfig",
            about: "Update the configuration of an input component",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "config.name",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Human readable name of the input",
                },
                FieldSpec {
                    path: "config.type",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Input type: switch, button, analog, or count",
                },
                FieldSpec {
                    path: "config.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable the input",
                },
                FieldSpec {
                    path: "config.invert",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Invert the logical input state",
                },
                FieldSpec {
                    path: "config.report_thr",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Analog report threshold in percent",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Input.SetConfig", raw),
        },
        RequestDescriptor {
            method: "Input.CheckExpression",
            about: "Evaluate an analog transform expression against test values",
            fields: &[
                FieldSpec {
                    path: "expr",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Expression to evaluate",
                },
                FieldSpec {
                    path: "inputs",
                    kind: FieldKind::FloatList,
                    nullable: false,
                    help: "Test input values",
                },
            ],
            decode: super::decode_raw,
        },
    ],
};

const ID_FIELD: FieldSpec = FieldSpec {
    path: "id",
    kind: FieldKind::UInt,
    nullable: false,
    help: "Id of the input component instance",
};

/// `Input.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputStatus {
    pub id: u8,

    /// Logical state for switch/button inputs. Absent for analog.
    #[serde(default)]
    pub state: Option<bool>,

    /// Analog value in percent. Absent for digital inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,

    /// Transformed analog value, if an xpercent expression is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpercent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
