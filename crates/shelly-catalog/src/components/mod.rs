//! Per-component request descriptors and typed responses.

pub mod ble;
pub mod cloud;
pub mod common;
pub mod cover;
pub mod input;
pub mod light;
pub mod mqtt;
pub mod schedule;
pub mod script;
pub mod sensors;
pub mod shelly;
pub mod switch;
pub mod sys;
pub mod wifi;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{CatalogError, ComponentCatalog};

/// Registry of every component, in CLI display order.
pub static ALL: &[&ComponentCatalog] = &[
    &ble::COMPONENT,
    &cloud::COMPONENT,
    &cover::COMPONENT,
    &sensors::DEVICE_POWER,
    &sensors::HUMIDITY,
    &input::COMPONENT,
    &light::COMPONENT,
    &mqtt::COMPONENT,
    &schedule::COMPONENT,
    &script::COMPONENT,
    &shelly::COMPONENT,
    &switch::COMPONENT,
    &sys::COMPONENT,
    &sensors::TEMPERATURE,
    &wifi::COMPONENT,
];

/// Round-trip `raw` through `T`, returning the normalized JSON.
pub(crate) fn decode_as<T>(method: &'static str, raw: Value) -> Result<Value, CatalogError>
where
    T: DeserializeOwned + Serialize,
{
    let typed: T =
        serde_json::from_value(raw).map_err(|source| CatalogError::Decode { method, source })?;
    serde_json::to_value(typed).map_err(|source| CatalogError::Decode { method, source })
}

/// Decode for responses with no meaningful body (`{}` or `null`).
pub(crate) fn decode_empty(_raw: Value) -> Result<Value, CatalogError> {
    Ok(Value::Object(serde_json::Map::new()))
}

/// Decode for responses kept as raw JSON (shape too dynamic to type).
pub(crate) fn decode_raw(raw: Value) -> Result<Value, CatalogError> {
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn methods_are_unique_across_components() {
        let mut seen = HashSet::new();
        for component in ALL {
            for request in component.requests {
                assert!(
                    seen.insert(request.method),
                    "duplicate method {}",
                    request.method
                );
            }
        }
    }

    #[test]
    fn field_paths_produce_unique_flags_per_request() {
        for component in ALL {
            for request in component.requests {
                let mut seen = HashSet::new();
                for field in request.fields {
                    assert!(
                        seen.insert(field.flag_name()),
                        "duplicate flag --{} on {}",
                        field.flag_name(),
                        request.method
                    );
                }
            }
        }
    }

    #[test]
    fn descriptor_lookup_is_case_insensitive() {
        assert!(crate::descriptor_for("Switch.Set").is_some());
        assert!(crate::descriptor_for("switch.set").is_some());
        assert!(crate::descriptor_for("Switch.NoSuchMethod").is_none());
    }
}
