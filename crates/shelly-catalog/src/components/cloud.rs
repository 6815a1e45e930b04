//! Cloud component RPCs.

use serde::{Deserialize, Serialize};

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "cloud",
    about: "RPCs related to Shelly Cloud",
    requests: &[
        RequestDescriptor {
            method: "Cloud.GetStatus",
            about: "Read the cloud connection status",
            fields: &[],
            decode: |raw| decode_as::<CloudStatus>("Cloud.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Cloud.GetConfig",
            about: "Read the cloud configuration",
            fields: &[],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Cloud.SetConfig",
            about: "Update the cloud configuration",
            fields: &[
                FieldSpec {
                    path: "config.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable the cloud connection",
                },
                FieldSpec {
                    path: "config.server",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Cloud endpoint as host:port",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Cloud.SetConfig", raw),
        },
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudStatus {
    pub connected: bool,
}
