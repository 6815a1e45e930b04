//! Declarative field schema for CLI flag generation.
//!
//! The original reflective approach (walk the request struct, one flag per
//! JSON-tagged field) is replaced by a static table: each request carries
//! one [`FieldSpec`] row per field, and the CLI derives flag names and
//! parsers from the rows alone. Request params are assembled as a JSON
//! object by writing each changed flag's value at the row's dotted path.

use serde_json::{Map, Value};

/// Scalar or list kind of one request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int,
    UInt,
    Float,
    String,
    StringList,
    FloatList,
    /// List of floats where `NaN` entries serialize as JSON `null`.
    NullableFloatList,
}

/// One settable request field.
///
/// `path` is the dotted JSON path within the request params, e.g.
/// `"config.auto_off_delay"`. The flag name is the kebab-cased path with a
/// leading `config-` segment dropped, so `config.auto_off_delay` becomes
/// `--auto-off-delay`.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub path: &'static str,
    pub kind: FieldKind,
    /// Whether the device accepts an explicit `null` for this field.
    pub nullable: bool,
    pub help: &'static str,
}

impl FieldSpec {
    /// CLI flag name for this field.
    pub fn flag_name(&self) -> String {
        let mut path = self.path;
        if let Some(rest) = path.strip_prefix("config.") {
            path = rest;
        }
        path.replace(['.', '_'], "-")
    }

    /// Environment variable bound to this flag (viper-style `-` → `_`).
    pub fn env_name(&self) -> String {
        format!(
            "SHELLYFLEET_{}",
            self.flag_name().to_uppercase().replace('-', "_")
        )
    }
}

/// Write `value` into `params` at the dotted `path`, creating intermediate
/// objects as needed. Existing non-object values along the path are
/// replaced.
pub fn set_path(params: &mut Value, path: &str, value: Value) {
    if !params.is_object() {
        *params = Value::Object(Map::new());
    }
    let mut cursor = params;
    let mut segments = path.split('.').peekable();
    while let Some(seg) = segments.next() {
        let map = cursor.as_object_mut().expect("cursor is an object");
        if segments.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        cursor = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flag_name_drops_config_prefix() {
        let spec = FieldSpec {
            path: "config.auto_off_delay",
            kind: FieldKind::Float,
            nullable: false,
            help: "",
        };
        assert_eq!(spec.flag_name(), "auto-off-delay");
        assert_eq!(spec.env_name(), "SHELLYFLEET_AUTO_OFF_DELAY");
    }

    #[test]
    fn flag_name_keeps_non_config_root() {
        let spec = FieldSpec {
            path: "toggle_after",
            kind: FieldKind::Float,
            nullable: false,
            help: "",
        };
        assert_eq!(spec.flag_name(), "toggle-after");
    }

    #[test]
    fn set_path_builds_nested_objects() {
        let mut params = Value::Null;
        set_path(&mut params, "id", json!(0));
        set_path(&mut params, "config.name", json!("porch"));
        set_path(&mut params, "config.auto_off", json!(true));
        assert_eq!(
            params,
            json!({"id": 0, "config": {"name": "porch", "auto_off": true}})
        );
    }

    #[test]
    fn set_path_replaces_scalar_intermediate() {
        let mut params = serde_json::json!({"config": 7});
        set_path(&mut params, "config.name", json!("x"));
        assert_eq!(params, json!({"config": {"name": "x"}}));
    }
}
