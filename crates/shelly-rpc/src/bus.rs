//! Notification bus: demux of asynchronous `Notify*` frames.
//!
//! Channels (scoped to the discoverer and fed by every open device
//! channel plus broker-wide topic subscriptions) exist per notification
//! kind and are created lazily by the first subscriber; the buffer size
//! requested then is final. Kinds nobody subscribed to are dropped
//! silently, so late subscribers never see history. When a channel is
//! full the dispatcher blocks: consumers are required to be prompt.

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use shelly_catalog::{NotifyEvent, NotifyStatus};

use crate::frame::Frame;

/// A `NotifyStatus` or `NotifyFullStatus` delivery.
///
/// The raw frame rides along for callers that need `src`/`dst` or the
/// untyped params.
#[derive(Debug, Clone, Serialize)]
pub struct StatusNotification {
    pub status: NotifyStatus,
    pub frame: Frame,
}

/// A `NotifyEvent` delivery.
#[derive(Debug, Clone, Serialize)]
pub struct EventNotification {
    pub event: NotifyEvent,
    pub frame: Frame,
}

#[derive(Default)]
struct BusState {
    status_tx: Option<mpsc::Sender<StatusNotification>>,
    full_status_tx: Option<mpsc::Sender<StatusNotification>>,
    event_tx: Option<mpsc::Sender<EventNotification>>,
}

/// Routes `Notify*` frames from any registered channel to typed
/// subscriber streams.
#[derive(Default)]
pub struct NotificationBus {
    state: Mutex<BusState>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `NotifyStatus` frames.
    ///
    /// The first call creates the channel with `buffer` capacity and
    /// returns its receiver; later calls return `None` because the stream
    /// already has an owner. Frames received before the first call are
    /// discarded.
    pub async fn status_notifications(
        &self,
        buffer: usize,
    ) -> Option<mpsc::Receiver<StatusNotification>> {
        let mut state = self.state.lock().await;
        if state.status_tx.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::channel(buffer);
        state.status_tx = Some(tx);
        Some(rx)
    }

    /// Subscribe to `NotifyFullStatus` frames. Same first-call contract
    /// as [`status_notifications`](Self::status_notifications).
    pub async fn full_status_notifications(
        &self,
        buffer: usize,
    ) -> Option<mpsc::Receiver<StatusNotification>> {
        let mut state = self.state.lock().await;
        if state.full_status_tx.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::channel(buffer);
        state.full_status_tx = Some(tx);
        Some(rx)
    }

    /// Subscribe to `NotifyEvent` frames. Same first-call contract as
    /// [`status_notifications`](Self::status_notifications).
    pub async fn event_notifications(
        &self,
        buffer: usize,
    ) -> Option<mpsc::Receiver<EventNotification>> {
        let mut state = self.state.lock().await;
        if state.event_tx.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::channel(buffer);
        state.event_tx = Some(tx);
        Some(rx)
    }

    /// Route one notification frame by method name.
    ///
    /// Dispatch order follows frame arrival per source channel; there is
    /// no global order across channels.
    pub async fn dispatch(&self, frame: Frame) {
        let Some(method) = frame.method.as_deref() else {
            return;
        };
        match method {
            "NotifyStatus" => {
                let tx = self.state.lock().await.status_tx.clone();
                if let Some(tx) = tx {
                    if let Some(notification) = decode_status(&frame) {
                        let _ = tx.send(notification).await;
                    }
                }
            }
            "NotifyFullStatus" => {
                let tx = self.state.lock().await.full_status_tx.clone();
                if let Some(tx) = tx {
                    if let Some(notification) = decode_status(&frame) {
                        let _ = tx.send(notification).await;
                    }
                }
            }
            "NotifyEvent" => {
                let tx = self.state.lock().await.event_tx.clone();
                if let Some(tx) = tx {
                    if let Some(notification) = decode_event(&frame) {
                        let _ = tx.send(notification).await;
                    }
                }
            }
            other => {
                tracing::debug!(method = %other, "dropping unrecognized notification");
            }
        }
    }
}

fn decode_status(frame: &Frame) -> Option<StatusNotification> {
    let params = frame.params.clone().unwrap_or_default();
    match serde_json::from_value::<NotifyStatus>(params) {
        Ok(status) => Some(StatusNotification {
            status,
            frame: frame.clone(),
        }),
        Err(e) => {
            tracing::error!(
                src = %frame.src,
                dst = %frame.dst,
                method = ?frame.method,
                error = %e,
                "unmarshalling status notification"
            );
            None
        }
    }
}

fn decode_event(frame: &Frame) -> Option<EventNotification> {
    let params = frame.params.clone().unwrap_or_default();
    match serde_json::from_value::<NotifyEvent>(params) {
        Ok(event) => Some(EventNotification {
            event,
            frame: frame.clone(),
        }),
        Err(e) => {
            tracing::error!(
                src = %frame.src,
                dst = %frame.dst,
                method = ?frame.method,
                error = %e,
                "unmarshalling event notification"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_frame(src: &str) -> Frame {
        serde_json::from_value(json!({
            "src": src,
            "dst": "fleet/events",
            "method": "NotifyStatus",
            "params": {"ts": 1.0, "switch:0": {"id": 0, "output": true}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn first_subscriber_gets_the_channel() {
        let bus = NotificationBus::new();
        assert!(bus.status_notifications(4).await.is_some());
        assert!(bus.status_notifications(9).await.is_none());
    }

    #[tokio::test]
    async fn dispatch_routes_by_method() {
        let bus = NotificationBus::new();
        let mut status_rx = bus.status_notifications(4).await.unwrap();
        let mut event_rx = bus.event_notifications(4).await.unwrap();

        bus.dispatch(status_frame("dev-a")).await;
        bus.dispatch(
            serde_json::from_value(json!({
                "src": "dev-a",
                "dst": "fleet/events",
                "method": "NotifyEvent",
                "params": {"ts": 2.0, "events": [
                    {"component": "input:0", "id": 0, "event": "btn_down"}
                ]}
            }))
            .unwrap(),
        )
        .await;

        let status = status_rx.recv().await.unwrap();
        assert_eq!(status.frame.src, "dev-a");
        assert!(status.status.components_of("switch").next().is_some());

        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event.events[0].event, "btn_down");
    }

    #[tokio::test]
    async fn unrequested_kinds_are_dropped_without_blocking() {
        let bus = NotificationBus::new();
        // No subscribers at all; must return immediately.
        for _ in 0..100 {
            bus.dispatch(status_frame("dev-b")).await;
        }
        // Late subscriber sees nothing from before.
        let mut rx = bus.status_notifications(1).await.unwrap();
        bus.dispatch(status_frame("dev-c")).await;
        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.frame.src, "dev-c");
    }

    #[tokio::test]
    async fn full_status_is_a_separate_stream() {
        let bus = NotificationBus::new();
        let mut full_rx = bus.full_status_notifications(4).await.unwrap();

        let mut frame = status_frame("dev-d");
        frame.method = Some("NotifyFullStatus".into());
        bus.dispatch(frame).await;

        assert_eq!(full_rx.recv().await.unwrap().frame.src, "dev-d");
    }
}
