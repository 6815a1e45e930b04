//! MQTT component RPCs (device-side MQTT client configuration).

use serde::{Deserialize, Serialize};

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "mqtt",
    about: "RPCs related to MQTT configuration and status",
    requests: &[
        RequestDescriptor {
            method: "MQTT.GetStatus",
            about: "Read the MQTT connection status",
            fields: &[],
            decode: |raw| decode_as::<MqttStatus>("MQTT.GetStatus", raw),
        },
        RequestDescriptor {
            method: "MQTT.GetConfig",
            about: "Read the MQTT configuration",
            fields: &[],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "MQTT.SetConfig",
            about: "Update the MQTT configuration",
            fields: &[
                FieldSpec {
                    path: "config.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable the MQTT client",
                },
                FieldSpec {
                    path: "config.server",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Broker address as host:port",
                },
                FieldSpec {
                    path: "config.client_id",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Client id; defaults to the device id",
                },
                FieldSpec {
                    path: "config.user",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Broker username",
                },
                FieldSpec {
                    path: "config.pass",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Broker password",
                },
                FieldSpec {
                    path: "config.ssl_ca",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "TLS mode: empty, \"*\", \"ca.pem\", or \"user_ca.pem\"",
                },
                FieldSpec {
                    path: "config.topic_prefix",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Topic prefix; defaults to the device id",
                },
                FieldSpec {
                    path: "config.rpc_ntf",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Publish RPC notifications to <prefix>/events/rpc",
                },
                FieldSpec {
                    path: "config.status_ntf",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Publish status updates to <prefix>/status/...",
                },
                FieldSpec {
                    path: "config.enable_rpc",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Accept RPC requests over MQTT",
                },
                FieldSpec {
                    path: "config.enable_control",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Accept control messages on <prefix>/command topics",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("MQTT.SetConfig", raw),
        },
    ],
};

/// `MQTT.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttStatus {
    pub connected: bool,
}
