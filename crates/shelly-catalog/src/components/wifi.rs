//! WiFi component RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "wifi",
    about: "RPCs related to wifi configuration and status",
    requests: &[
        RequestDescriptor {
            method: "Wifi.GetStatus",
            about: "Read the wifi connection status",
            fields: &[],
            decode: |raw| decode_as::<WifiStatus>("Wifi.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Wifi.GetConfig",
            about: "Read the wifi configuration",
            fields: &[],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Wifi.SetConfig",
            about: "Update the wifi configuration",
            fields: &[
                FieldSpec {
                    path: "config.ap.ssid",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "SSID of the built-in access point",
                },
                FieldSpec {
                    path: "config.ap.pass",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Password for the built-in access point",
                },
                FieldSpec {
                    path: "config.ap.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable the built-in access point",
                },
                FieldSpec {
                    path: "config.sta.ssid",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "SSID of the primary station network",
                },
                FieldSpec {
                    path: "config.sta.pass",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Password for the primary station network",
                },
                FieldSpec {
                    path: "config.sta.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable the primary station network",
                },
                FieldSpec {
                    path: "config.sta.ipv4mode",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "IPv4 mode: dhcp or static",
                },
                FieldSpec {
                    path: "config.sta.ip",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Static IP address",
                },
                FieldSpec {
                    path: "config.sta.netmask",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Static netmask",
                },
                FieldSpec {
                    path: "config.sta.gw",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Static gateway",
                },
                FieldSpec {
                    path: "config.sta.nameserver",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Static nameserver",
                },
                FieldSpec {
                    path: "config.sta1.ssid",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "SSID of the fallback station network",
                },
                FieldSpec {
                    path: "config.sta1.pass",
                    kind: FieldKind::String,
                    nullable: true,
                    help: "Password for the fallback station network",
                },
                FieldSpec {
                    path: "config.sta1.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable the fallback station network",
                },
                FieldSpec {
                    path: "config.roam.rssi_thr",
                    kind: FieldKind::Int,
                    nullable: false,
                    help: "RSSI threshold that triggers AP roaming",
                },
                FieldSpec {
                    path: "config.roam.interval",
                    kind: FieldKind::Int,
                    nullable: false,
                    help: "Roaming scan interval in seconds; 0 disables",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Wifi.SetConfig", raw),
        },
    ],
};

/// `Wifi.GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiStatus {
    #[serde(default)]
    pub sta_ip: Option<String>,

    /// One of disconnected, connecting, connected, got ip.
    pub status: String,

    #[serde(default)]
    pub ssid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap_client_count: Option<u32>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
