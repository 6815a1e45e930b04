//! Sensor-style components: temperature, humidity, device power.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::SetConfigResponse;
use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static TEMPERATURE: ComponentCatalog = ComponentCatalog {
    name: "temperature",
    about: "RPCs related to temperature sensors",
    requests: &[
        RequestDescriptor {
            method: "Temperature.GetStatus",
            about: "Read a temperature sensor",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<TemperatureStatus>("Temperature.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Temperature.GetConfig",
            about: "Read the configuration of a temperature sensor",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Temperature.SetConfig",
            about: "Update the configuration of a temperature sensor",
            fields: &[
                ID_FIELD,
                NAME_FIELD,
                FieldSpec {
                    path: "config.report_thr_C",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Report when the reading moves by this many degrees C",
                },
                FieldSpec {
                    path: "config.offset_C",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Calibration offset in degrees C",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Temperature.SetConfig", raw),
        },
    ],
};

pub static HUMIDITY: ComponentCatalog = ComponentCatalog {
    name: "humidity",
    about: "RPCs related to humidity sensors",
    requests: &[
        RequestDescriptor {
            method: "Humidity.GetStatus",
            about: "Read a humidity sensor",
            fields: &[ID_FIELD],
            decode: |raw| decode_as::<HumidityStatus>("Humidity.GetStatus", raw),
        },
        RequestDescriptor {
            method: "Humidity.GetConfig",
            about: "Read the configuration of a humidity sensor",
            fields: &[ID_FIELD],
            decode: super::decode_raw,
        },
        RequestDescriptor {
            method: "Humidity.SetConfig",
            about: "Update the configuration of a humidity sensor",
            fields: &[
                ID_FIELD,
                NAME_FIELD,
                FieldSpec {
                    path: "config.report_thr",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Report when the reading moves by this many percent",
                },
                FieldSpec {
                    path: "config.offset",
                    kind: FieldKind::Float,
                    nullable: false,
                    help: "Calibration offset in percent",
                },
            ],
            decode: |raw| decode_as::<SetConfigResponse>("Humidity.SetConfig", raw),
        },
    ],
};

pub static DEVICE_POWER: ComponentCatalog = ComponentCatalog {
    name: "device-power",
    about: "RPCs related to device power and battery status",
    requests: &[RequestDescriptor {
        method: "DevicePower.GetStatus",
        about: "Read battery and external power status",
        fields: &[ID_FIELD],
        decode: |raw| decode_as::<DevicePowerStatus>("DevicePower.GetStatus", raw),
    }],
};

const ID_FIELD: FieldSpec = FieldSpec {
    path: "id",
    kind: FieldKind::UInt,
    nullable: false,
    help: "Id of the component instance",
};

const NAME_FIELD: FieldSpec = FieldSpec {
    path: "config.name",
    kind: FieldKind::String,
    nullable: true,
    help: "Human readable name of the sensor",
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureStatus {
    pub id: u8,

    #[serde(rename = "tC", default)]
    pub celsius: Option<f64>,

    #[serde(rename = "tF", default)]
    pub fahrenheit: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumidityStatus {
    pub id: u8,

    #[serde(default)]
    pub rh: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePowerStatus {
    pub id: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryStatus {
    #[serde(rename = "V", default)]
    pub volts: Option<f64>,

    #[serde(default)]
    pub percent: Option<f64>,
}
