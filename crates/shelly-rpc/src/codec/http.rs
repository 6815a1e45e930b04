//! HTTP codec: one RPC call is one POST of the request frame to `/rpc`,
//! with the response frame in the body. No multiplexing; calls on one
//! codec are serialized.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use url::Url;

use super::Codec;
use crate::error::RpcError;
use crate::frame::Frame;

/// TLS trust configuration for HTTPS devices.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Trust a custom CA bundle (PEM bytes).
    CustomCa(Vec<u8>),
    /// Accept any certificate. Shelly devices ship self-signed certs.
    DangerAcceptInvalid,
}

pub struct HttpCodec {
    http: reqwest::Client,
    url: Url,
    // One POST in flight at a time; replies land here for recv().
    inbound_tx: mpsc::UnboundedSender<Frame>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    send_lock: Mutex<()>,
    closed: Arc<AtomicBool>,
}

impl HttpCodec {
    /// Build a codec POSTing to `url` (already validated to end in `/rpc`).
    pub fn new(url: Url, tls: &TlsMode, timeout: Duration) -> Result<Self, RpcError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        match tls {
            TlsMode::System => {}
            TlsMode::CustomCa(pem) => {
                let cert = reqwest::Certificate::from_pem(pem)
                    .map_err(|e| RpcError::InvalidAddress(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        let http = builder
            .build()
            .map_err(|e| RpcError::Unreachable(format!("building HTTP client: {e}")))?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            http,
            url,
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            send_lock: Mutex::new(()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Codec for HttpCodec {
    async fn send(&self, frame: Frame) -> Result<(), RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Closed);
        }
        let _guard = self.send_lock.lock().await;

        let resp = self
            .http
            .post(self.url.clone())
            .json(&frame)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout
                } else {
                    RpcError::Unreachable(format!("POST {}: {e}", self.url))
                }
            })?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| RpcError::Unreachable(format!("reading response body: {e}")))?;
        if !status.is_success() && status != reqwest::StatusCode::UNAUTHORIZED {
            return Err(RpcError::Unreachable(format!(
                "POST {}: HTTP {status}",
                self.url
            )));
        }

        let response: Frame = serde_json::from_slice(&body)
            .map_err(|e| RpcError::Malformed(format!("response body is not a frame: {e}")))?;
        // Delivery only fails after close(); the caller sees Closed on recv.
        let _ = self.inbound_tx.send(response);
        Ok(())
    }

    async fn recv(&self) -> Result<Frame, RpcError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or(RpcError::Closed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.inbound_rx.lock().await.close();
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn rpc_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/rpc", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn post_roundtrip_delivers_response_frame() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(|req: &Request| {
                let frame: Frame = serde_json::from_slice(&req.body).unwrap();
                assert_eq!(frame.method.as_deref(), Some("Shelly.GetStatus"));
                ResponseTemplate::new(200).set_body_json(json!({
                    "id": frame.id,
                    "src": "shellypro3-000000000001",
                    "dst": frame.src,
                    "result": {"sys": {"uptime": 12}}
                }))
            })
            .mount(&server)
            .await;

        let codec =
            HttpCodec::new(rpc_url(&server), &TlsMode::System, Duration::from_secs(5)).unwrap();
        codec
            .send(Frame::request(41, "test-client", "Shelly.GetStatus", None))
            .await
            .unwrap();

        let response = codec.recv().await.unwrap();
        assert_eq!(response.id, Some(41));
        assert_eq!(response.result.unwrap()["sys"]["uptime"], json!(12));
    }

    #[tokio::test]
    async fn unreachable_host_is_surfaced() {
        // Port 9 (discard) is about as unreachable as it gets.
        let codec = HttpCodec::new(
            Url::parse("http://127.0.0.1:9/rpc").unwrap(),
            &TlsMode::System,
            Duration::from_millis(300),
        )
        .unwrap();
        let err = codec
            .send(Frame::request(1, "test-client", "Shelly.GetStatus", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Unreachable(_) | RpcError::Timeout));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_recv_reports_closed() {
        let server = MockServer::start().await;
        let codec =
            HttpCodec::new(rpc_url(&server), &TlsMode::System, Duration::from_secs(1)).unwrap();
        codec.close().await;
        codec.close().await;
        assert!(!codec.is_connected());
        assert!(matches!(codec.recv().await, Err(RpcError::Closed)));
    }

    #[tokio::test]
    async fn http_error_status_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let codec =
            HttpCodec::new(rpc_url(&server), &TlsMode::System, Duration::from_secs(1)).unwrap();
        let err = codec
            .send(Frame::request(1, "test-client", "Shelly.GetStatus", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Unreachable(_)));
    }
}
