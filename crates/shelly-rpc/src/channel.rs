//! Channel: a live codec plus the machinery above it.
//!
//! The channel owns the inbound pump for one device connection. Frames
//! with a `Notify*` method go to the notification bus; everything else is
//! matched against pending calls by frame id, so concurrent callers on
//! one channel each see exactly their own response regardless of arrival
//! order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::bus::NotificationBus;
use crate::codec::Codec;
use crate::error::RpcError;
use crate::frame::{next_frame_id, Frame, FrameAuth};

type PendingMap = Arc<StdMutex<HashMap<i64, oneshot::Sender<Result<Frame, RpcError>>>>>;

pub struct Channel {
    codec: Arc<dyn Codec>,
    local_id: String,
    pending: PendingMap,
    cancel: CancellationToken,
    disconnected: AtomicBool,
}

impl Channel {
    /// Wrap a connected codec and spawn the inbound pump. `Notify*` frames
    /// are dispatched to `bus` for as long as the channel stays open.
    pub fn open(codec: Arc<dyn Codec>, local_id: String, bus: Arc<NotificationBus>) -> Arc<Self> {
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let pump_codec = Arc::clone(&codec);
        let pump_pending = Arc::clone(&pending);
        let pump_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = pump_cancel.cancelled() => break,
                    received = pump_codec.recv() => match received {
                        Ok(frame) if frame.is_notification() => {
                            bus.dispatch(frame).await;
                        }
                        Ok(frame) => {
                            let Some(id) = frame.id else {
                                tracing::debug!("dropping inbound frame without id");
                                continue;
                            };
                            let waiter = pump_pending
                                .lock()
                                .expect("pending map poisoned")
                                .remove(&id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(Ok(frame));
                                }
                                None => {
                                    tracing::debug!(id, "response frame matched no pending call");
                                }
                            }
                        }
                        Err(RpcError::Closed) => {
                            fail_all(&pump_pending, RpcError::Closed);
                            break;
                        }
                        Err(e) => {
                            // Can't attribute the failure to one call, so
                            // every waiter gets it.
                            tracing::warn!(error = %e, "channel receive failed");
                            fail_all(&pump_pending, e);
                        }
                    }
                }
            }
        });

        Arc::new(Self {
            codec,
            local_id,
            pending,
            cancel,
            disconnected: AtomicBool::new(false),
        })
    }

    /// The local endpoint id stamped into outbound frames.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Issue one request and wait for the matching response frame.
    ///
    /// Assigns the frame id; deadlines belong to the executor above.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        auth: Option<FrameAuth>,
    ) -> Result<Frame, RpcError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(RpcError::Closed);
        }
        let id = next_frame_id();
        let mut frame = Frame::request(id, self.local_id.clone(), method, params);
        frame.auth = auth;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, tx);

        if let Err(e) = self.codec.send(frame).await {
            self.pending
                .lock()
                .expect("pending map poisoned")
                .remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Closed),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Acquire) && self.codec.is_connected()
    }

    /// Tear the channel down. Safe to call any number of times.
    pub async fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.codec.close().await;
        fail_all(&self.pending, RpcError::Closed);
    }
}

fn fail_all(pending: &PendingMap, error: RpcError) {
    let waiters: Vec<_> = pending
        .lock()
        .expect("pending map poisoned")
        .drain()
        .collect();
    for (_, tx) in waiters {
        let _ = tx.send(Err(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{mpsc, Mutex};

    /// Codec double that answers every request from a scripted function
    /// and can inject unsolicited frames.
    struct ScriptedCodec {
        inject_tx: mpsc::UnboundedSender<Frame>,
        inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
        respond: Box<dyn Fn(&Frame) -> Option<Frame> + Send + Sync>,
        connected: AtomicBool,
    }

    impl ScriptedCodec {
        fn new(respond: impl Fn(&Frame) -> Option<Frame> + Send + Sync + 'static) -> Arc<Self> {
            let (inject_tx, inbound) = mpsc::unbounded_channel();
            Arc::new(Self {
                inject_tx,
                inbound: Mutex::new(inbound),
                respond: Box::new(respond),
                connected: AtomicBool::new(true),
            })
        }

        fn inject(&self, frame: Frame) {
            let _ = self.inject_tx.send(frame);
        }
    }

    #[async_trait]
    impl Codec for ScriptedCodec {
        async fn send(&self, frame: Frame) -> Result<(), RpcError> {
            if let Some(response) = (self.respond)(&frame) {
                let _ = self.inject_tx.send(response);
            }
            Ok(())
        }

        async fn recv(&self) -> Result<Frame, RpcError> {
            let mut rx = self.inbound.lock().await;
            rx.recv().await.ok_or(RpcError::Closed)
        }

        async fn close(&self) {
            self.connected.store(false, Ordering::Release);
            self.inbound.lock().await.close();
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }
    }

    fn echo_codec() -> Arc<ScriptedCodec> {
        ScriptedCodec::new(|request| {
            Some(Frame {
                id: request.id,
                src: "device".into(),
                dst: request.src.clone(),
                result: Some(json!({"echo": request.method})),
                ..Frame::default()
            })
        })
    }

    #[tokio::test]
    async fn call_matches_response_by_id() {
        let codec = echo_codec();
        let channel = Channel::open(codec, "fleet-test".into(), Arc::new(NotificationBus::new()));

        let response = channel.call("Shelly.GetStatus", None, None).await.unwrap();
        assert_eq!(response.result.unwrap()["echo"], json!("Shelly.GetStatus"));
    }

    #[tokio::test]
    async fn concurrent_calls_each_get_their_own_response() {
        let codec = echo_codec();
        let channel = Channel::open(codec, "fleet-test".into(), Arc::new(NotificationBus::new()));

        let (a, b) = tokio::join!(
            channel.call("Sys.GetStatus", None, None),
            channel.call("Wifi.GetStatus", None, None),
        );
        assert_eq!(a.unwrap().result.unwrap()["echo"], json!("Sys.GetStatus"));
        assert_eq!(b.unwrap().result.unwrap()["echo"], json!("Wifi.GetStatus"));
    }

    #[tokio::test]
    async fn notifications_reach_the_bus_not_the_callers() {
        let codec = ScriptedCodec::new(|_| None);
        let bus = Arc::new(NotificationBus::new());
        let mut status_rx = bus.status_notifications(4).await.unwrap();
        let channel: Arc<Channel> = Channel::open(codec.clone(), "fleet-test".into(), bus);

        codec.inject(
            serde_json::from_value(json!({
                "src": "device",
                "dst": "fleet-test",
                "method": "NotifyStatus",
                "params": {"ts": 5.0, "switch:0": {"id": 0, "output": false}}
            }))
            .unwrap(),
        );

        let delivered = status_rx.recv().await.unwrap();
        assert_eq!(delivered.frame.src, "device");
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_fails_pending_calls() {
        let codec = ScriptedCodec::new(|_| None); // never responds
        let channel = Channel::open(
            codec,
            "fleet-test".into(),
            Arc::new(NotificationBus::new()),
        );

        let pending = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.call("Sys.GetStatus", None, None).await })
        };
        tokio::task::yield_now().await;

        channel.disconnect().await;
        channel.disconnect().await;

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(RpcError::Closed)));
        assert!(!channel.is_connected());
        assert!(matches!(
            channel.call("Sys.GetStatus", None, None).await,
            Err(RpcError::Closed)
        ));
    }
}
