//! Shared MQTT broker client.
//!
//! One broker connection serves every MQTT-backed device in the process.
//! Inbound publishes are routed to subscribers by topic filter; the codec
//! layer keeps reply topics disjoint so responses can never cross devices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const ROUTE_BUFFER: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Connection settings for the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<BrokerTls>,
}

#[derive(Debug, Clone, Default)]
pub struct BrokerTls {
    /// PEM CA bundle used to validate the broker identity.
    pub ca: Option<Vec<u8>>,
    /// Skip host certificate verification entirely.
    pub insecure_skip_verify: bool,
}

/// One inbound publish, routed to a subscription.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

struct Route {
    filter: String,
    tx: mpsc::Sender<InboundMessage>,
}

/// Handle to the shared broker connection.
pub struct BrokerClient {
    client: AsyncClient,
    client_id: String,
    connected: Arc<AtomicBool>,
    routes: Arc<StdMutex<Vec<Route>>>,
    cancel: CancellationToken,
}

impl BrokerClient {
    /// Connect, wait for the first CONNACK, and spawn the dispatch loop.
    pub async fn connect(config: BrokerConfig) -> Result<Arc<Self>, RpcError> {
        tracing::info!(
            broker = %format!("{}:{}", config.host, config.port),
            client_id = %config.client_id,
            "connecting to MQTT broker"
        );
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        } else if let Some(user) = &config.username {
            options.set_credentials(user, "");
        }
        if let Some(tls) = &config.tls {
            options.set_transport(Transport::Tls(tls.to_rumqttc()?));
        }

        let (client, mut event_loop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let routes: Arc<StdMutex<Vec<Route>>> = Arc::new(StdMutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        // Drive the event loop until the broker acknowledges us so that a
        // bad address or credentials fail the command up front.
        let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
        loop {
            let event = tokio::time::timeout_at(deadline, event_loop.poll())
                .await
                .map_err(|_| RpcError::Unreachable("MQTT connect timed out".into()))?;
            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected.store(true, Ordering::Release);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(RpcError::Unreachable(format!("MQTT connect error: {e}")));
                }
            }
        }

        let loop_connected = Arc::clone(&connected);
        let loop_routes = Arc::clone(&routes);
        let loop_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = loop_cancel.cancelled() => break,
                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!("MQTT broker connection (re)established");
                            loop_connected.store(true, Ordering::Release);
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            dispatch(&loop_routes, publish.topic, publish.payload.to_vec()).await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Reconnection is the event loop's job; surface
                            // the gap as a warning and keep polling.
                            tracing::warn!(error = %e, "lost connection to MQTT broker");
                            loop_connected.store(false, Ordering::Release);
                            tokio::time::sleep(RECONNECT_PAUSE).await;
                        }
                    }
                }
            }
        });

        Ok(Arc::new(Self {
            client,
            client_id: config.client_id,
            connected,
            routes,
            cancel,
        }))
    }

    /// The broker client id, used in per-device reply topics.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Subscribe to `filter` and return the stream of matching publishes.
    pub async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<InboundMessage>, RpcError> {
        let (tx, rx) = mpsc::channel(ROUTE_BUFFER);
        self.routes.lock().expect("routes poisoned").push(Route {
            filter: filter.to_string(),
            tx,
        });
        tracing::debug!(topic = %filter, "subscribing");
        self.client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| RpcError::Unreachable(format!("MQTT subscribe {filter}: {e}")))?;
        Ok(rx)
    }

    /// Remove the subscription for `filter`.
    pub async fn unsubscribe(&self, filter: &str) -> Result<(), RpcError> {
        self.routes
            .lock()
            .expect("routes poisoned")
            .retain(|route| route.filter != filter);
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|e| RpcError::Unreachable(format!("MQTT unsubscribe {filter}: {e}")))?;
        Ok(())
    }

    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RpcError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| RpcError::Unreachable(format!("MQTT publish {topic}: {e}")))
    }

    /// Tear down the connection. Subscribers see their streams end.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        self.routes.lock().expect("routes poisoned").clear();
        let _ = self.client.disconnect().await;
        self.connected.store(false, Ordering::Release);
    }
}

async fn dispatch(routes: &StdMutex<Vec<Route>>, topic: String, payload: Vec<u8>) {
    let matching: Vec<mpsc::Sender<InboundMessage>> = {
        let routes = routes.lock().expect("routes poisoned");
        routes
            .iter()
            .filter(|route| topic_matches(&route.filter, &topic))
            .map(|route| route.tx.clone())
            .collect()
    };
    if matching.is_empty() {
        tracing::debug!(topic = %topic, "inbound publish matched no subscription");
        return;
    }
    for tx in matching {
        let message = InboundMessage {
            topic: topic.clone(),
            payload: payload.clone(),
        };
        // Blocking send: subscribers are required to be prompt.
        if tx.send(message).await.is_err() {
            tracing::debug!(topic = %topic, "subscription receiver dropped");
        }
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');
    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

impl BrokerTls {
    fn to_rumqttc(&self) -> Result<TlsConfiguration, RpcError> {
        if self.insecure_skip_verify {
            let config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth();
            return Ok(TlsConfiguration::Rustls(Arc::new(config)));
        }
        let ca = self.ca.clone().ok_or_else(|| {
            RpcError::InvalidAddress("TLS requested without a CA bundle".into())
        })?;
        Ok(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        })
    }
}

/// Accepts any broker certificate. Only reachable via an explicit
/// `--mqtt-tls-insecure`.
#[derive(Debug)]
struct NoVerification;

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_filter_wildcards() {
        assert!(topic_matches("+/events/rpc", "shellyplus1-abc/events/rpc"));
        assert!(!topic_matches("+/events/rpc", "a/b/events/rpc"));
        assert!(topic_matches("shellies/#", "shellies/announce"));
        assert!(topic_matches("shellies/#", "shellies/a/b/c"));
        assert!(topic_matches("exact/topic", "exact/topic"));
        assert!(!topic_matches("exact/topic", "exact/topic/extra"));
        assert!(!topic_matches("exact/topic/extra", "exact/topic"));
    }

    #[test]
    fn reply_topics_are_disjoint_per_device() {
        let c1 = "p1/rpc-resp/shellyfleet-1/rpc";
        let c2 = "p2/rpc-resp/shellyfleet-1/rpc";
        assert!(topic_matches(c1, c1));
        assert!(!topic_matches(c1, c2));
    }
}
