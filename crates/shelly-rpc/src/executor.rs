//! RPC execution: deadlines, error surfacing, and the digest-auth retry.

use std::time::Duration;

use serde_json::Value;

use crate::auth::{AuthCallback, AuthChallenge};
use crate::channel::Channel;
use crate::error::RpcError;
use crate::frame::Frame;

/// Per-call policy.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Hard deadline for the whole call including the auth retry. Callers
    /// on MQTT-retained setups typically raise this to the device's wake
    /// period.
    pub timeout: Option<Duration>,

    /// Credential source consulted when the device answers 401.
    pub auth: Option<AuthCallback>,

    /// Human description of the device, used in credential prompts.
    pub description: String,
}

/// Issue `method` on `channel` and return the `result` member.
///
/// A 401 error frame triggers one digest retry through the credential
/// callback; a second 401 after valid credentials is `AuthFailed`. Any
/// other error frame surfaces as [`RpcError::Device`].
pub async fn call(
    channel: &Channel,
    method: &str,
    params: Option<Value>,
    opts: &CallOptions,
) -> Result<Value, RpcError> {
    match opts.timeout {
        Some(timeout) => tokio::time::timeout(timeout, call_inner(channel, method, params, opts))
            .await
            .map_err(|_| RpcError::Timeout)?,
        None => call_inner(channel, method, params, opts).await,
    }
}

async fn call_inner(
    channel: &Channel,
    method: &str,
    params: Option<Value>,
    opts: &CallOptions,
) -> Result<Value, RpcError> {
    let response = channel.call(method, params.clone(), None).await?;
    let error = match response.error {
        None => return Ok(result_of(response)),
        Some(error) => error,
    };
    if error.code != 401 {
        return Err(RpcError::Device {
            code: error.code,
            message: error.message,
        });
    }

    let Some(credentials) = &opts.auth else {
        return Err(RpcError::AuthRequired(opts.description.clone()));
    };
    let challenge = AuthChallenge::parse(&error.message)?;
    let password = credentials(opts.description.clone()).await?;
    let auth = challenge.respond(&password);
    tracing::debug!(method, realm = %challenge.realm, "retrying with digest auth");

    let retry = channel.call(method, params, Some(auth)).await?;
    match retry.error {
        None => Ok(result_of(retry)),
        Some(error) if error.code == 401 => Err(RpcError::AuthFailed(opts.description.clone())),
        Some(error) => Err(RpcError::Device {
            code: error.code,
            message: error.message,
        }),
    }
}

fn result_of(frame: Frame) -> Value {
    frame.result.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::constant_password;
    use crate::bus::NotificationBus;
    use crate::codec::Codec;
    use crate::frame::FrameError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    const CHALLENGE: &str = r#"{"auth_type":"digest","nonce":1619545138,"nc":1,"realm":"shellypro3-000000000001","algorithm":"SHA-256"}"#;

    /// Device double that demands digest auth until a frame carries one.
    struct AuthingCodec {
        inject_tx: mpsc::UnboundedSender<Frame>,
        inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
        connected: AtomicBool,
    }

    impl AuthingCodec {
        fn new() -> Arc<Self> {
            let (inject_tx, inbound) = mpsc::unbounded_channel();
            Arc::new(Self {
                inject_tx,
                inbound: Mutex::new(inbound),
                connected: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl Codec for AuthingCodec {
        async fn send(&self, frame: Frame) -> Result<(), RpcError> {
            let response = if frame.auth.is_some() {
                Frame {
                    id: frame.id,
                    src: "device".into(),
                    dst: frame.src.clone(),
                    result: Some(json!({"authed": true})),
                    ..Frame::default()
                }
            } else {
                Frame {
                    id: frame.id,
                    src: "device".into(),
                    dst: frame.src.clone(),
                    error: Some(FrameError {
                        code: 401,
                        message: CHALLENGE.to_string(),
                    }),
                    ..Frame::default()
                }
            };
            let _ = self.inject_tx.send(response);
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

    fn channel_over(codec: Arc<dyn Codec>) -> Arc<Channel> {
        Channel::open(codec, "fleet-test".into(), Arc::new(NotificationBus::new()))
    }

    #[tokio::test]
    async fn auth_challenge_is_retried_with_digest() {
        let channel = channel_over(AuthingCodec::new());
        let opts = CallOptions {
            auth: Some(constant_password("secret".into())),
            description: "test device".into(),
            ..CallOptions::default()
        };
        let result = call(&channel, "Sys.GetStatus", None, &opts).await.unwrap();
        assert_eq!(result["authed"], json!(true));
    }

    #[tokio::test]
    async fn missing_credentials_surface_auth_required() {
        let channel = channel_over(AuthingCodec::new());
        let err = call(&channel, "Sys.GetStatus", None, &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::AuthRequired(_)));
    }

    /// Codec that never responds; used for deadline coverage.
    struct SilentCodec {
        inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
        _inject_tx: mpsc::UnboundedSender<Frame>,
    }

    #[async_trait]
    impl Codec for SilentCodec {
        async fn send(&self, _frame: Frame) -> Result<(), RpcError> {
            Ok(())
        }
        async fn recv(&self) -> Result<Frame, RpcError> {
            let mut rx = self.inbound.lock().await;
            rx.recv().await.ok_or(RpcError::Closed)
        }
        async fn close(&self) {}
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn deadline_elapsing_is_timeout() {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = channel_over(Arc::new(SilentCodec {
            inbound: Mutex::new(rx),
            _inject_tx: tx,
        }));
        let opts = CallOptions {
            timeout: Some(Duration::from_millis(50)),
            ..CallOptions::default()
        };
        let err = call(&channel, "Sys.GetStatus", None, &opts).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout));
    }

    /// Device error frames map onto typed errors.
    struct ErroringCodec {
        inject_tx: mpsc::UnboundedSender<Frame>,
        inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
    }

    #[async_trait]
    impl Codec for ErroringCodec {
        async fn send(&self, frame: Frame) -> Result<(), RpcError> {
            let _ = self.inject_tx.send(Frame {
                id: frame.id,
                error: Some(FrameError {
                    code: -103,
                    message: "Invalid argument 'id'".into(),
                }),
                ..Frame::default()
            });
            Ok(())
        }
        async fn recv(&self) -> Result<Frame, RpcError> {
            let mut rx = self.inbound.lock().await;
            rx.recv().await.ok_or(RpcError::Closed)
        }
        async fn close(&self) {}
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn device_error_frames_become_typed_errors() {
        let (inject_tx, inbound) = mpsc::unbounded_channel();
        let channel = channel_over(Arc::new(ErroringCodec {
            inject_tx,
            inbound: Mutex::new(inbound),
        }));
        let err = call(&channel, "Switch.Set", Some(json!({"id": 9})), &CallOptions::default())
            .await
            .unwrap_err();
        match err {
            RpcError::Device { code, message } => {
                assert_eq!(code, -103);
                assert!(message.contains("Invalid argument"));
            }
            other => panic!("expected Device error, got {other:?}"),
        }
    }
}
