//! System component RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "sys",
    about: "RPCs related to system management and status",
    requests: &[
        RequestDescriptor {
            method: "Sys.GetStatus",
            about: "Read system status: time, uptime, memory, update info",
            fields: &[],
            decode: |raw| decode_as::<SysStatus>("Sys.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Sys.GetConfig",
            about: "Read the system configuration",
            fields: &[],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Sys.SetConfig",
            about: "Update the system configuration",
            fields: &[
                FieldSpec {
                    path: "config.device.name",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Device name",
                },
                FieldSpec {
                    path: "config.device.eco_mode",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Reduce power usage at the cost of performance",
                },
                FieldSpec {
                    path: "config.device.discoverable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Advertise the device via mDNS",
                },
                FieldSpec {
                    path: "config.location.tz",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Timezone, e.g. Europe/Sofia",
                },
                FieldSpec {
                    path: "config.location.lat",
                    kind: FieldKind::Float,
                    nullable: true,
                    help: "Latitude in degrees",
                },
                FieldSpec {
                    path: "config.location.lon",
                    kind: FieldKind::Float,
                    nullable: true,
                    help: "Longitude in degrees",
                },
                FieldSpec {
                    path: "config.sntp.server",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "SNTP server to sync time from",
                },
                FieldSpec {
                    path: "config.debug.mqtt.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Emit debug logs over MQTT",
                },
                FieldSpec {
                    path: "config.debug.websocket.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Emit debug logs over WebSocket",
                },
                FieldSpec {
                    path: "config.debug.udp.addr",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "host:port to stream UDP debug logs to",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Sys.SetConfig", raw),
        },
    ],
};

/// `Sys.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysStatus {
    #[serde(default)]
    pub mac: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_required: Option<bool>,

    /// Local time, `HH:MM` while unsynced.
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unixtime: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_free: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_free: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_rev: Option<u64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
