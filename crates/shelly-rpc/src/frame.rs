//! The mgRPC wire unit.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One mgRPC frame. Requests carry `method`/`params`, responses `result`
/// or `error`; unused members are omitted on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Local endpoint id; replies are routed back to it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub src: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dst: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FrameError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<FrameAuth>,
}

/// Error member of a response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameError {
    pub code: i32,

    #[serde(default)]
    pub message: String,
}

/// Digest-auth response attached to a retried request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameAuth {
    pub realm: String,
    pub username: String,
    pub nonce: i64,
    pub cnonce: i64,
    pub response: String,
    pub algorithm: String,
}

impl Frame {
    /// Build a request frame. The id must come from [`next_frame_id`].
    pub fn request(id: i64, src: impl Into<String>, method: &str, params: Option<Value>) -> Self {
        Self {
            id: Some(id),
            src: src.into(),
            method: Some(method.to_string()),
            params,
            ..Self::default()
        }
    }

    /// Whether this is an asynchronous `Notify*` frame rather than a
    /// response to one of our requests.
    pub fn is_notification(&self) -> bool {
        self.method
            .as_deref()
            .is_some_and(|m| m.starts_with("Notify"))
    }
}

static FRAME_ID: OnceLock<AtomicI64> = OnceLock::new();

/// Allocate the next frame id from the process-wide counter.
///
/// The counter is seeded randomly at startup so a reused local endpoint id
/// (BLE MAC, MQTT reply topic) across restarts cannot collide with frames
/// a device still has in flight from the previous run. Ids stay within the
/// positive 63-bit range.
pub fn next_frame_id() -> i64 {
    let counter =
        FRAME_ID.get_or_init(|| AtomicI64::new(rand::thread_rng().gen_range(0..i64::MAX / 2)));
    counter.fetch_add(1, Ordering::Relaxed) & i64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frame_omits_unused_members() {
        let frame = Frame::request(7, "shellyfleet-1", "Shelly.GetStatus", None);
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            wire,
            json!({"id": 7, "src": "shellyfleet-1", "method": "Shelly.GetStatus"})
        );
    }

    #[test]
    fn response_frame_roundtrips() {
        let wire = json!({
            "id": 7,
            "src": "shellypro3-000000000001",
            "dst": "shellyfleet-1",
            "result": {"ok": true}
        });
        let frame: Frame = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(frame.id, Some(7));
        assert!(frame.error.is_none());
        assert_eq!(serde_json::to_value(&frame).unwrap(), wire);
    }

    #[test]
    fn notification_frames_are_recognized() {
        let frame: Frame = serde_json::from_value(json!({
            "src": "shellyplus1-a", "dst": "anything/events",
            "method": "NotifyStatus", "params": {"ts": 1.0}
        }))
        .unwrap();
        assert!(frame.is_notification());

        let response = Frame {
            id: Some(1),
            result: Some(json!({})),
            ..Frame::default()
        };
        assert!(!response.is_notification());
    }

    #[test]
    fn frame_ids_are_monotonic_and_positive() {
        let a = next_frame_id();
        let b = next_frame_id();
        assert!(a >= 0);
        assert!(b > a);
    }
}
