//! Script component RPCs.
//!
//! `Script.PutCode` is intentionally absent from the descriptor table: code
//! upload is chunked line-by-line by the bulk-data command, which builds
//! its frames directly.

use serde::{Deserialize, Serialize};

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "script",
    about: "RPCs related to managing scripts",
    requests: &[
        RequestDescriptor {
            method: "Script.List",
            about: "List the scripts on the device",
            fields: &[],
            decode: |raw| decode_as::<ScriptListResponse>("Script.List", raw),
        },
        RequestDescriptor {
            method: "Script.Create",
            about: "Create a new script slot",
            fields: &[FieldSpec {
                path: "name",
                kind: FieldKind::String,
                nullable: false,
                help: "Name of the new script",
            }],
            decode: |raw| decode_as::<ScriptCreateResponse>("Script.Create", raw),
        },
        RequestDescriptor {
            method: "Script.GetStatus",
            about: "Read the status of a script",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<ScriptStatus>("Script.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Script.GetConfig",
            about: "Read the configuration of a script",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Script.SetConfig",
            about: "Update the configuration of a script",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "config.name",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Script name",
                },
                FieldSpec {
                    path: "config.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Run the script at boot",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Script.SetConfig", raw),
        },
        RequestDescriptor {
            method: "Script.Start",
            about: "Start a script",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<ScriptRunResponse>("Script.Start", raw),
        },
        RequestDescriptor {
            method: "Script.Stop",
            about: "Stop a running script",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<ScriptRunResponse>("Script.Stop", raw),
        },
        RequestDescriptor {
            method: "Script.Eval",
            about: "Evaluate an expression inside a running script",
            fields: &[
                ID_FIELD,
                FieldSpec {
                    path: "expr",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Expression to evaluate",
                },
            ],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Script.Delete",
            about: "Delete a script",
            fields: &[ID_FIELD],
            decode: super::decode_empty,
        },
    ],
};

const ID_FIELD: FieldSpec = FieldSpec {
    path: "id",
    kind: FieldKind::UInt,
    nullable: false,
    help: "Id of the script",
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptListResponse {
    pub scripts: Vec<ScriptSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSummary {
    pub id: u32,
    pub name: String,
    pub enable: bool,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptCreateResponse {
    pub id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptStatus {
    pub id: u32,
    pub running: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRunResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_running: Option<bool>,
}
