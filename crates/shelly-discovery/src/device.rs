//! One known device and its channel lifecycle.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use url::Url;

use shelly_catalog::components::shelly::DeviceInfo;
use shelly_catalog::DeviceSpecs;
use shelly_rpc::auth::AuthCallback;
use shelly_rpc::broker::BrokerClient;
use shelly_rpc::codec::ble::BleCodec;
use shelly_rpc::codec::http::{HttpCodec, TlsMode};
use shelly_rpc::codec::mqtt::MqttCodec;
use shelly_rpc::codec::ws::WsCodec;
use shelly_rpc::codec::Codec;
use shelly_rpc::executor::{self, CallOptions};
use shelly_rpc::{Channel, NotificationBus, RpcError};

use crate::error::DiscoveryError;

/// How a device entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    Manual,
    Mdns,
    Ble,
    Mqtt,
}

impl fmt::Display for DeviceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Mdns => "mdns",
            Self::Ble => "ble",
            Self::Mqtt => "mqtt",
        };
        f.write_str(name)
    }
}

/// Exactly one transport binding per device.
#[derive(Debug, Clone)]
pub enum ChannelUri {
    /// `http://` or `https://` endpoint, path always `/rpc`.
    Http(Url),
    /// `ws://` or `wss://` endpoint.
    Ws(Url),
    /// BLE device by upper-case MAC.
    Ble(String),
    /// MQTT topic prefix (usually the device id).
    MqttPrefix(String),
}

impl fmt::Display for ChannelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(url) | Self::Ws(url) => write!(f, "{url}"),
            Self::Ble(mac) => write!(f, "ble://{mac}"),
            Self::MqttPrefix(prefix) => f.write_str(prefix),
        }
    }
}

/// Shared plumbing the discoverer hands to every device it creates.
pub(crate) struct DeviceContext {
    pub bus: Arc<NotificationBus>,
    pub local_id: String,
    pub http_tls: TlsMode,
    pub http_timeout: Duration,
    pub search_timeout: Duration,
    pub rpc_timeout: Option<Duration>,
    /// Weak so devices never keep the broker connection alive on their own.
    pub broker: StdMutex<Weak<BrokerClient>>,
}

impl DeviceContext {
    pub(crate) fn broker(&self) -> Option<Arc<BrokerClient>> {
        self.broker.lock().expect("broker slot poisoned").upgrade()
    }
}

/// A logical endpoint identified by its 12-hex-digit MAC address.
pub struct Device {
    uri: ChannelUri,
    source: DeviceSource,
    ctx: Arc<DeviceContext>,

    mac: StdMutex<Option<String>>,
    name: StdMutex<Option<String>>,
    specs: StdMutex<Option<DeviceSpecs>>,
    last_seen: StdMutex<SystemTime>,

    auth: Mutex<Option<AuthCallback>>,
    memoized_password: StdMutex<Option<String>>,

    /// BLE connections persist across calls; the codec is created once.
    ble: Mutex<Option<Arc<BleCodec>>>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("uri", &self.uri)
            .field("source", &self.source)
            .field("mac", &self.mac.lock().expect("mac poisoned"))
            .field("name", &self.name.lock().expect("name poisoned"))
            .finish_non_exhaustive()
    }
}

impl Device {
    pub(crate) fn new(
        uri: ChannelUri,
        source: DeviceSource,
        ctx: Arc<DeviceContext>,
        auth: Option<AuthCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uri,
            source,
            ctx,
            mac: StdMutex::new(None),
            name: StdMutex::new(None),
            specs: StdMutex::new(None),
            last_seen: StdMutex::new(SystemTime::now()),
            auth: Mutex::new(auth),
            memoized_password: StdMutex::new(None),
            ble: Mutex::new(None),
        })
    }

    pub fn uri(&self) -> &ChannelUri {
        &self.uri
    }

    pub fn source(&self) -> DeviceSource {
        self.source
    }

    /// Canonical upper-case MAC, once known.
    pub fn mac(&self) -> Option<String> {
        self.mac.lock().expect("mac poisoned").clone()
    }

    pub(crate) fn set_mac(&self, mac: &str) {
        *self.mac.lock().expect("mac poisoned") = Some(canonical_mac(mac));
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().expect("name poisoned").clone()
    }

    pub(crate) fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().expect("name poisoned") = Some(name.into());
    }

    pub fn specs(&self) -> Option<DeviceSpecs> {
        *self.specs.lock().expect("specs poisoned")
    }

    pub fn last_seen(&self) -> SystemTime {
        *self.last_seen.lock().expect("last_seen poisoned")
    }

    /// Refresh the liveness timestamp. Monotonically non-decreasing.
    pub(crate) fn touch(&self) {
        let mut last_seen = self.last_seen.lock().expect("last_seen poisoned");
        let now = SystemTime::now();
        if now > *last_seen {
            *last_seen = now;
        }
    }

    /// Name for humans: configured name, else the channel URI.
    pub fn best_name(&self) -> String {
        self.name()
            .unwrap_or_else(|| self.uri.to_string())
    }

    /// Replace the credential callback (URL userinfo beats the default).
    pub(crate) async fn set_auth(&self, auth: AuthCallback) {
        *self.auth.lock().await = Some(auth);
    }

    /// Credential source for the executor, memoizing the password after
    /// its first use so interactive prompts happen at most once per
    /// device.
    pub fn auth_callback(self: &Arc<Self>) -> Option<AuthCallback> {
        let device = Arc::clone(self);
        Some(Arc::new(move |description| {
            let device = Arc::clone(&device);
            Box::pin(async move { device.resolve_password(description).await })
        }))
    }

    async fn resolve_password(&self, description: String) -> Result<String, RpcError> {
        if let Some(password) = self
            .memoized_password
            .lock()
            .expect("memoized_password poisoned")
            .clone()
        {
            return Ok(password);
        }
        let callback = self.auth.lock().await.clone();
        let Some(callback) = callback else {
            return Err(RpcError::AuthRequired(description));
        };
        let password = callback(description).await?;
        *self
            .memoized_password
            .lock()
            .expect("memoized_password poisoned") = Some(password.clone());
        Ok(password)
    }

    /// Per-call options with this device's auth and the configured
    /// RPC deadline.
    pub fn call_options(self: &Arc<Self>) -> CallOptions {
        CallOptions {
            timeout: self.ctx.rpc_timeout,
            auth: self.auth_callback(),
            description: self.best_name(),
        }
    }

    /// Open an mgRPC channel to the device.
    ///
    /// Selects the codec from the URI, registers the channel with the
    /// notification bus, and returns a handle whose `disconnect` is
    /// idempotent.
    pub async fn open(self: &Arc<Self>) -> Result<Arc<Channel>, DiscoveryError> {
        let codec: Arc<dyn Codec> = match &self.uri {
            ChannelUri::Http(url) => {
                let codec = HttpCodec::new(
                    url.clone(),
                    &self.ctx.http_tls,
                    self.ctx.http_timeout,
                )?;
                tracing::info!(device = %self.best_name(), channel_protocol = "http", "connected to device");
                Arc::new(codec)
            }
            ChannelUri::Ws(url) => {
                let codec = WsCodec::connect(url.clone()).await?;
                tracing::info!(device = %self.best_name(), channel_protocol = "ws", "connected to device");
                Arc::new(codec)
            }
            ChannelUri::Ble(mac) => {
                let codec = self.ble_codec(mac).await;
                codec.open().await?;
                codec
            }
            ChannelUri::MqttPrefix(prefix) => {
                let broker = self
                    .ctx
                    .broker()
                    .ok_or(DiscoveryError::BrokerNotConnected)?;
                tracing::debug!(device = %self.best_name(), channel_protocol = "mqtt", "opening mqtt rpc channel");
                Arc::new(MqttCodec::new(prefix.clone(), &broker))
            }
        };
        Ok(Channel::open(
            codec,
            self.ctx.local_id.clone(),
            Arc::clone(&self.ctx.bus),
        ))
    }

    async fn ble_codec(&self, mac: &str) -> Arc<BleCodec> {
        let mut slot = self.ble.lock().await;
        if let Some(codec) = slot.as_ref() {
            return Arc::clone(codec);
        }
        let codec = Arc::new(BleCodec::new(mac, self.ctx.search_timeout));
        *slot = Some(Arc::clone(&codec));
        codec
    }

    /// Adopt a BLE codec the search driver already connected.
    pub(crate) async fn adopt_ble_codec(&self, codec: Arc<BleCodec>) {
        *self.ble.lock().await = Some(codec);
    }

    /// Query `Shelly.GetDeviceInfo` and fill MAC, name, and the
    /// capability vector.
    pub async fn resolve_specs(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        let channel = self.open().await?;
        let result = executor::call(
            &channel,
            "Shelly.GetDeviceInfo",
            None,
            &self.call_options(),
        )
        .await;
        channel.disconnect().await;

        let info: DeviceInfo = serde_json::from_value(result?)
            .map_err(|e| RpcError::Malformed(format!("decoding device info: {e}")))?;
        let specs = DeviceSpecs::from_app(&info.app, info.profile.as_deref())?;

        self.set_mac(&info.mac);
        if let Some(name) = info.name.filter(|n| !n.is_empty()) {
            self.set_name(name);
        }
        *self.specs.lock().expect("specs poisoned") = Some(specs);
        tracing::debug!(
            device = %self.best_name(),
            mac = %info.mac,
            app = %info.app,
            "resolved device specs"
        );
        Ok(())
    }
}

/// Upper-case the 12-hex-digit MAC key.
pub(crate) fn canonical_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_mac_is_uppercase_without_separators() {
        assert_eq!(canonical_mac("aa:bb:cc:dd:ee:ff"), "AABBCCDDEEFF");
        assert_eq!(canonical_mac("A0B1C2D3E4F5"), "A0B1C2D3E4F5");
    }

    #[test]
    fn channel_uri_display_forms() {
        assert_eq!(
            ChannelUri::Http(Url::parse("http://192.0.2.1/rpc").unwrap()).to_string(),
            "http://192.0.2.1/rpc"
        );
        assert_eq!(ChannelUri::Ble("AABBCCDDEEFF".into()).to_string(), "ble://AABBCCDDEEFF");
        assert_eq!(
            ChannelUri::MqttPrefix("shellyplugus-0123456789ab".into()).to_string(),
            "shellyplugus-0123456789ab"
        );
    }
}
