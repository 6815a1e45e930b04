//! MQTT codec: one logical device over the shared broker connection.
//!
//! Each device with topic prefix `P` publishes requests to `P/rpc` and
//! receives replies on its own `P/rpc-resp/<client-id>/rpc` subscription.
//! Reply topics embed both the prefix and the broker client id, so two
//! codecs on the same broker connection can never see each other's
//! responses. Closing a codec removes only the subscriptions it created;
//! the broker connection belongs to the discoverer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::Codec;
use crate::broker::{BrokerClient, InboundMessage};
use crate::error::RpcError;
use crate::frame::Frame;

pub struct MqttCodec {
    // Weak: codec lifetime must not keep the broker connection alive.
    broker: Weak<BrokerClient>,
    prefix: String,
    state: Mutex<MqttCodecState>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    closed: AtomicBool,
}

#[derive(Default)]
struct MqttCodecState {
    /// Local endpoint id, `<prefix>/rpc-resp/<client-id>`. Set on first send.
    src: Option<String>,
    /// Reply topic this codec subscribed; unsubscribed again on close.
    sub_topic: Option<String>,
}

impl MqttCodec {
    pub fn new(prefix: impl Into<String>, broker: &Arc<BrokerClient>) -> Self {
        Self {
            broker: Arc::downgrade(broker),
            prefix: prefix.into(),
            state: Mutex::new(MqttCodecState::default()),
            inbound_rx: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn broker(&self) -> Result<Arc<BrokerClient>, RpcError> {
        self.broker.upgrade().ok_or(RpcError::Closed)
    }

    /// The local endpoint id, once the first send has established it.
    pub async fn src(&self) -> Option<String> {
        self.state.lock().await.src.clone()
    }
}

#[async_trait]
impl Codec for MqttCodec {
    async fn send(&self, mut frame: Frame) -> Result<(), RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Closed);
        }
        let broker = self.broker()?;

        {
            let mut state = self.state.lock().await;
            if state.src.is_none() {
                let src = format!("{}/rpc-resp/{}", self.prefix, broker.client_id());
                let sub_topic = format!("{src}/rpc");
                let rx = broker.subscribe(&sub_topic).await?;
                *self.inbound_rx.lock().await = Some(rx);
                state.src = Some(src);
                state.sub_topic = Some(sub_topic);
            }
            frame.src = state.src.clone().expect("src just set");
        }
        if frame.dst.is_empty() {
            frame.dst = self.prefix.clone();
        }

        let payload = serde_json::to_vec(&frame)
            .map_err(|e| RpcError::Malformed(format!("encoding frame: {e}")))?;
        let topic = format!("{}/rpc", self.prefix);
        tracing::debug!(topic = %topic, id = ?frame.id, "publishing request frame");
        broker.publish(&topic, payload).await
    }

    async fn recv(&self) -> Result<Frame, RpcError> {
        loop {
            let message = {
                let mut guard = self.inbound_rx.lock().await;
                let rx = guard.as_mut().ok_or(RpcError::Closed)?;
                rx.recv().await
            };
            let Some(message) = message else {
                return Err(RpcError::Closed);
            };
            match serde_json::from_slice::<Frame>(&message.payload) {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    // Skip garbage rather than killing the channel; the
                    // broker may retain unrelated junk on our topic.
                    tracing::warn!(
                        topic = %message.topic,
                        error = %e,
                        "inbound MQTT message is not a frame"
                    );
                }
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let sub_topic = self.state.lock().await.sub_topic.take();
        if let (Some(topic), Some(broker)) = (sub_topic, self.broker.upgrade()) {
            if let Err(e) = broker.unsubscribe(&topic).await {
                tracing::warn!(topic = %topic, error = %e, "unsubscribe on close failed");
            }
        }
        if let Some(rx) = self.inbound_rx.lock().await.as_mut() {
            rx.close();
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self
                .broker
                .upgrade()
                .map(|b| b.is_connected())
                .unwrap_or(false)
    }
}
