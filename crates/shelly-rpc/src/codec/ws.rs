//! WebSocket codec: connects once, then frames flow both directions.
//! Correlation is by frame id, handled above in the channel layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::Codec;
use crate::error::RpcError;
use crate::frame::Frame;

pub struct WsCodec {
    outbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<mpsc::Receiver<Frame>>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl WsCodec {
    /// Connect to `ws(s)://host/rpc` and spawn the read/write pumps.
    pub async fn connect(url: Url) -> Result<Self, RpcError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RpcError::Unreachable(format!("websocket connect {url}: {e}")))?;
        tracing::debug!(url = %url, "websocket connected");

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(16);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(16);
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let writer_cancel = cancel.clone();
        let writer_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_cancel.cancelled() => break,
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to encode outbound frame");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "websocket write failed");
                            writer_connected.store(false, Ordering::Release);
                            break;
                        }
                    }
                }
            }
            let _ = write.close().await;
        });

        let reader_cancel = cancel.clone();
        let reader_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = reader_cancel.cancelled() => break,
                    message = read.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<Frame>(&text) {
                                    Ok(frame) => {
                                        if inbound_tx.send(frame).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "inbound message is not a frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::debug!("websocket closed by peer");
                                break;
                            }
                            Some(Ok(_)) => {} // ping/pong/binary
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "websocket read failed");
                                break;
                            }
                        }
                    }
                }
            }
            reader_connected.store(false, Ordering::Release);
        });

        Ok(Self {
            outbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            connected,
            cancel,
        })
    }
}

#[async_trait]
impl Codec for WsCodec {
    async fn send(&self, frame: Frame) -> Result<(), RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Closed);
        }
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| RpcError::Closed)
    }

    async fn recv(&self) -> Result<Frame, RpcError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or(RpcError::Closed)
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
