//! BLE component RPCs (device-side Bluetooth configuration).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "ble",
    about: "RPCs related to Bluetooth Low-Energy",
    requests: &[
        RequestDescriptor {
            method: "BLE.GetStatus",
            about: "Read the BLE status",
            fields: &[],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "BLE.GetConfig",
            about: "Read the BLE configuration",
            fields: &[],
            decode: |raw| decode_as::<BleConfig>("BLE.GetConfig", raw),
        },
        RequestDescriptor {
            method: "BLE.SetConfig",
            about: "Update the BLE configuration",
            fields: &[
                FieldSpec {
                    path: "config.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Enable Bluetooth",
                },
                FieldSpec {
                    path: "config.rpc.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Accept RPC requests over BLE GATT",
                },
                FieldSpec {
                    path: "config.observer.enable",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Relay BLE advertisements as a BTHome observer",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("BLE.SetConfig", raw),
        },
    ],
};

/// `BLE.GetConfig` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    pub enable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observer: Option<Value>,
}
