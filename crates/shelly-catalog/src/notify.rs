//! Typed payloads for asynchronous `Notify*` frames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of `NotifyStatus` and `NotifyFullStatus` frames.
///
/// Component statuses arrive keyed by instance name (`"switch:0"`,
/// `"cover:1"`, `"sys"`, …); their shapes differ per component so they are
/// kept as raw JSON. `NotifyFullStatus` uses the same shape with every
/// component present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyStatus {
    /// Device-reported unix timestamp. Subject to clock skew.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,

    /// Per-component status objects, keyed by `"<component>:<id>"`.
    #[serde(flatten)]
    pub components: BTreeMap<String, Value>,
}

/// Payload of `NotifyEvent` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,

    #[serde(default)]
    pub events: Vec<ComponentEvent>,
}

/// A single event within a `NotifyEvent` batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentEvent {
    pub component: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,

    /// Event-specific extras the device attaches beyond the core fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NotifyStatus {
    /// Iterate component statuses whose key matches `component` (e.g.
    /// `"switch"`), yielding `(instance id, status)` pairs.
    pub fn components_of<'a>(
        &'a self,
        component: &'a str,
    ) -> impl Iterator<Item = (Option<u8>, &'a Value)> + 'a {
        self.components.iter().filter_map(move |(key, value)| {
            let (name, id) = match key.split_once(':') {
                Some((name, id)) => (name, id.parse().ok()),
                None => (key.as_str(), None),
            };
            (name == component).then_some((id, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_keeps_component_keys() {
        let status: NotifyStatus = serde_json::from_value(json!({
            "ts": 1700000000.12,
            "switch:0": {"id": 0, "output": true, "apower": 12.5},
            "sys": {"uptime": 42}
        }))
        .unwrap();

        assert_eq!(status.ts, Some(1700000000.12));
        let switches: Vec<_> = status.components_of("switch").collect();
        assert_eq!(switches.len(), 1);
        assert_eq!(switches[0].0, Some(0));
        assert_eq!(switches[0].1["output"], json!(true));
        assert_eq!(status.components_of("cover").count(), 0);
    }

    #[test]
    fn event_batch_decodes() {
        let event: NotifyEvent = serde_json::from_value(json!({
            "ts": 1700000001.0,
            "events": [
                {"component": "input:1", "id": 1, "event": "btn_down", "ts": 1700000001.0}
            ]
        }))
        .unwrap();

        assert_eq!(event.events.len(), 1);
        assert_eq!(event.events[0].event, "btn_down");
    }
}
