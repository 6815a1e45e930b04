//! Device-level `Shelly.*` RPCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_as, decode_empty, decode_raw};
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "shelly",
    about: "RPCs related to device management, configuration, and status",
    requests: &[
        RequestDescriptor {
            method: "Shelly.GetDeviceInfo",
            about: "Read device identity and firmware information",
            fields: &[FieldSpec {
                path: "ident",
                kind: FieldKind::Bool,
                nullable: false,
                help: "Include the full identity block",
            }],
            decode: |raw| decode_as::<DeviceInfo>("Shelly.GetDeviceInfo", raw),
        },
        RequestDescriptor {
            method: "Shelly.GetStatus",
            about: "Read the status of every component on the device",
            fields: &[],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.GetConfig",
            about: "Read the configuration of every component on the device",
            fields: &[],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.GetComponents",
            about: "List dynamic components with status and configuration",
            fields: &[
                FieldSpec {
                    path: "offset",
                    kind: FieldKind::UInt,
                    nullable: false,
                    help: "Index of the first component to return",
                },
                FieldSpec {
                    path: "include",
                    kind: FieldKind::StringList,
                    nullable: false,
                    help: "Extra data to include: status, config",
                },
                FieldSpec {
                    path: "dynamic_only",
                    kind: FieldKind::Bool,
                    nullable: false,
                    help: "Only list dynamic components",
                },
            ],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.ListMethods",
            about: "List every RPC method the device supports",
            fields: &[],
            decode: |raw| decode_as::<ListMethodsResponse>("Shelly.ListMethods", raw),
        },
        RequestDescriptor {
            method: "Shelly.ListProfiles",
            about: "List the device profiles this model supports",
            fields: &[],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.ListTimezones",
            about: "List the timezones the device accepts",
            fields: &[],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.SetProfile",
            about: "Switch the device profile (switch/cover); reboots the device",
            fields: &[FieldSpec {
                path: "name",
                kind: FieldKind::String,
                nullable: false,
                help: "Profile to activate",
            }],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.CheckForUpdate",
            about: "Check whether new firmware is available",
            fields: &[],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.Update",
            about: "Start a firmware update",
            fields: &[
                FieldSpec {
                    path: "stage",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Update channel: stable or beta",
                },
                FieldSpec {
                    path: "url",
                    kind: FieldKind::String,
                    nullable: false,
                    help: "Explicit firmware bundle URL",
                },
            ],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Shelly.DetectLocation",
            about: "Detect the device location from its external IP",
            fields: &[],
            decode: decode_raw,
        },
        RequestDescriptor {
            method: "Shelly.Reboot",
            about: "Reboot the device",
            fields: &[FieldSpec {
                path: "delay_ms",
                kind: FieldKind::UInt,
                nullable: false,
                help: "Delay before the reboot in milliseconds",
            }],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Shelly.FactoryReset",
            about: "Reset the device to factory defaults",
            fields: &[],
            decode: decode_empty,
        },
        RequestDescriptor {
            method: "Shelly.ResetWiFiConfig",
            about: "Reset only the WiFi configuration",
            fields: &[],
            decode: decode_empty,
        },
    ],
};

/// `Shelly.GetDeviceInfo` response.
///
/// `mac` is the canonical upper-case 12-hex-digit key used by the device
/// registry; `app` + `profile` feed capability vector resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device id, e.g. `"shellypro3-aabbccddeeff"`. Doubles as the auth realm.
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub mac: String,

    pub model: String,

    /// Device generation. Gen1 devices speak a different protocol entirely.
    pub gen: serde_json::Number,

    pub fw_id: String,

    pub ver: String,

    pub app: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default)]
    pub auth_en: bool,

    #[serde(default)]
    pub auth_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMethodsResponse {
    pub methods: Vec<String>,
}

/// Responses for the bulk-data RPCs (`Shelly.PutUserCA` and friends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDataResponse {
    /// Bytes of payload the device has accepted so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<u64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_info_decodes_gen2_pro3() {
        let info: DeviceInfo = serde_json::from_value(json!({
            "name": null,
            "id": "shellypro3-000000000001",
            "mac": "000000000001",
            "slot": 0,
            "model": "SPSW-003XE16EU",
            "gen": 2,
            "fw_id": "20231219-133956/1.1.0-g34b5d4f",
            "ver": "1.1.0",
            "app": "Pro3",
            "auth_en": false,
            "auth_domain": null
        }))
        .unwrap();
        assert_eq!(info.app, "Pro3");
        assert_eq!(info.gen.as_u64(), Some(2));
        assert!(!info.auth_en);
    }
}
