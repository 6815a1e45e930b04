//! The discoverer: registry of known devices and search orchestration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use shelly_rpc::auth::constant_password;
use shelly_rpc::broker::BrokerClient;
use shelly_rpc::{Frame, NotificationBus};

use crate::approve::ConfirmGate;
use crate::config::DiscovererConfig;
use crate::device::{canonical_mac, ChannelUri, Device, DeviceContext, DeviceSource};
use crate::error::DiscoveryError;

/// Process-wide owner of the device registry, the shared broker client,
/// and the notification bus.
pub struct Discoverer {
    pub(crate) config: DiscovererConfig,
    pub(crate) ctx: Arc<DeviceContext>,
    devices: StdMutex<HashMap<String, Arc<Device>>>,
    broker: Mutex<Option<Arc<BrokerClient>>>,
    pub(crate) gate: Option<ConfirmGate>,
}

impl Discoverer {
    pub fn new(config: DiscovererConfig) -> Arc<Self> {
        let gate = config.confirm.clone().map(ConfirmGate::new);
        let ctx = Arc::new(DeviceContext {
            bus: Arc::new(NotificationBus::new()),
            local_id: config.local_id.clone(),
            http_tls: config.http_tls.clone(),
            // The per-request reqwest deadline tracks the RPC deadline;
            // the executor enforces the precise one.
            http_timeout: config.rpc_timeout.unwrap_or(Duration::from_secs(30)),
            search_timeout: config.search_timeout,
            rpc_timeout: config.rpc_timeout,
            broker: StdMutex::new(Weak::new()),
        });
        Arc::new(Self {
            config,
            ctx,
            devices: StdMutex::new(HashMap::new()),
            broker: Mutex::new(None),
            gate,
        })
    }

    /// The notification bus fed by every open channel.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.ctx.bus
    }

    pub fn config(&self) -> &DiscovererConfig {
        &self.config
    }

    /// The shared broker client, once `connect_mqtt` has run.
    pub async fn broker(&self) -> Option<Arc<BrokerClient>> {
        self.broker.lock().await.clone()
    }

    // ── Registry ─────────────────────────────────────────────────────

    /// Install a device keyed by canonical MAC. Idempotent: re-adding a
    /// known MAC refreshes `last_seen` and returns the existing object.
    /// Returns `(device, is_new)`.
    pub fn add_device(&self, device: Arc<Device>) -> (Arc<Device>, bool) {
        let Some(mac) = device.mac() else {
            // Devices reach here only after MAC resolution; a missing MAC
            // is a driver bug, not a user error.
            unreachable!("add_device requires a resolved MAC");
        };
        let mut devices = self.devices.lock().expect("registry poisoned");
        match devices.get(&mac) {
            Some(existing) => {
                existing.touch();
                (Arc::clone(existing), false)
            }
            None => {
                devices.insert(mac, Arc::clone(&device));
                (device, true)
            }
        }
    }

    /// Whether a MAC is already registered.
    pub fn is_known_device(&self, mac: &str) -> bool {
        self.devices
            .lock()
            .expect("registry poisoned")
            .contains_key(&canonical_mac(mac))
    }

    /// Snapshot of every known device.
    pub fn all_devices(&self) -> Vec<Arc<Device>> {
        self.devices
            .lock()
            .expect("registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Drop non-manual devices unseen for longer than the device TTL.
    /// Long-lived commands call this between search rounds.
    pub fn evict_expired(&self) {
        let Some(cutoff) = SystemTime::now().checked_sub(self.config.device_ttl) else {
            return;
        };
        let mut devices = self.devices.lock().expect("registry poisoned");
        devices.retain(|mac, device| {
            let keep =
                device.source() == DeviceSource::Manual || device.last_seen() >= cutoff;
            if !keep {
                tracing::info!(mac = %mac, source = %device.source(), "device TTL elapsed, evicting");
            }
            keep
        });
    }

    // ── Manual adds ──────────────────────────────────────────────────

    /// Parse a user-supplied address, probe the device, and install it.
    ///
    /// Accepts bare hosts (scheme defaults to `http`), `http`/`https`
    /// URLs with an empty or `/rpc` path, optional userinfo credentials,
    /// and mDNS-zone hostnames (resolved via the mDNS driver).
    pub async fn add_device_by_address(
        self: &Arc<Self>,
        addr: &str,
    ) -> Result<Arc<Device>, DiscoveryError> {
        self.add_device_by_address_from(addr, DeviceSource::Manual)
            .await
    }

    pub(crate) async fn add_device_by_address_from(
        self: &Arc<Self>,
        addr: &str,
        source: DeviceSource,
    ) -> Result<Arc<Device>, DiscoveryError> {
        let addr = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        let mut url = Url::parse(&addr)
            .map_err(|e| DiscoveryError::InvalidAddress(format!("{addr}: {e}")))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(DiscoveryError::InvalidAddress(format!(
                    "unsupported URI scheme {other:?}"
                )))
            }
        }
        match url.path() {
            "" | "/" => url.set_path("/rpc"),
            "/rpc" => {}
            other => {
                return Err(DiscoveryError::InvalidAddress(format!(
                    "unsupported URI path {other:?}"
                )))
            }
        }
        if url.query().is_some() {
            return Err(DiscoveryError::InvalidAddress(
                "URI query parameters are not supported".into(),
            ));
        }

        // Userinfo becomes the per-device credential callback. A single
        // element (`http://secret@host/`) is treated as the password.
        let auth = match (url.username(), url.password()) {
            ("", None) => None,
            (_, Some(password)) => Some(constant_password(password.to_string())),
            (password, None) => Some(constant_password(password.to_string())),
        };
        let _ = url.set_username("");
        let _ = url.set_password(None);

        // Hostnames inside the mDNS zone resolve via the mDNS driver,
        // not DNS.
        if let Some(host) = url.host_str().map(|h| h.to_string()) {
            let zone_suffix = format!(".{}", self.config.mdns_zone.to_lowercase());
            if host.to_lowercase().ends_with(&zone_suffix) {
                let ip = crate::mdns::resolve_hostname(&host, self.config.search_timeout).await?;
                url.set_ip_host(ip).map_err(|_| {
                    DiscoveryError::InvalidAddress(format!("cannot rewrite host {host}"))
                })?;
            }
        }

        let device = Device::new(
            ChannelUri::Http(url),
            source,
            Arc::clone(&self.ctx),
            auth.or_else(|| self.config.default_auth.clone()),
        );
        device.resolve_specs().await?;
        let (device, _) = self.add_device(device);
        Ok(device)
    }

    /// Install a BLE device by MAC without probing it.
    pub fn add_ble_device(self: &Arc<Self>, mac: &str) -> Arc<Device> {
        let mac = canonical_mac(mac);
        let device = Device::new(
            ChannelUri::Ble(mac.clone()),
            DeviceSource::Ble,
            Arc::clone(&self.ctx),
            self.config.default_auth.clone(),
        );
        device.set_mac(&mac);
        let (device, _) = self.add_device(device);
        device
    }

    /// Install an MQTT device by device id / topic prefix.
    ///
    /// Shelly device ids end in the MAC (`shellyplugus-0123456789ab`);
    /// when the suffix parses, the registry key comes for free,
    /// otherwise the device is probed over the broker.
    pub async fn add_mqtt_device(
        self: &Arc<Self>,
        device_id: &str,
    ) -> Result<Arc<Device>, DiscoveryError> {
        let device = Device::new(
            ChannelUri::MqttPrefix(device_id.to_string()),
            DeviceSource::Mqtt,
            Arc::clone(&self.ctx),
            self.config.default_auth.clone(),
        );
        device.set_name(device_id);

        match device_id.rsplit_once('-') {
            Some((_, suffix)) if suffix.len() == 12 && suffix.chars().all(|c| c.is_ascii_hexdigit()) => {
                device.set_mac(suffix);
            }
            _ => device.resolve_specs().await?,
        }
        let (device, _) = self.add_device(device);
        Ok(device)
    }

    // ── MQTT connect ─────────────────────────────────────────────────

    /// Connect the shared broker client and route the configured
    /// notification topics into the bus. A no-op without MQTT
    /// configuration.
    pub async fn connect_mqtt(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        let Some(mqtt) = &self.config.mqtt else {
            tracing::debug!("no MQTT broker configured; skipping connect");
            return Ok(());
        };
        let mut slot = self.broker.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let broker = BrokerClient::connect(mqtt.broker.clone()).await?;
        *self.ctx.broker.lock().expect("broker slot poisoned") = Arc::downgrade(&broker);

        for topic in &mqtt.topics {
            let mut rx = broker.subscribe(topic).await?;
            let bus = Arc::clone(&self.ctx.bus);
            let topic = topic.clone();
            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    match serde_json::from_slice::<Frame>(&message.payload) {
                        Ok(frame) => bus.dispatch(frame).await,
                        Err(e) => {
                            tracing::warn!(
                                topic = %message.topic,
                                error = %e,
                                "notification payload is not a frame"
                            );
                        }
                    }
                }
                tracing::debug!(topic = %topic, "notification subscription ended");
            });
        }

        *slot = Some(broker);
        Ok(())
    }

    // ── Search ───────────────────────────────────────────────────────

    /// Fan out to every enabled search driver in parallel.
    ///
    /// Drivers share one stop token (a "use this and stop" answer in any
    /// driver drains all of them) and one confirmation gate. One
    /// driver's failure does not stop its siblings; the first error is
    /// returned after all drivers settle, and every successfully
    /// installed device stays in the registry either way.
    pub async fn search(self: &Arc<Self>) -> Result<Vec<Arc<Device>>, DiscoveryError> {
        let stop = CancellationToken::new();

        let mdns = self.search_mdns(&stop);
        let ble = self.search_ble(&stop);
        let mqtt = self.search_mqtt(&stop);
        let (mdns, ble, mqtt) = tokio::join!(mdns, ble, mqtt);

        let mut devices = Vec::new();
        let mut first_error = None;
        for outcome in [mdns, ble, mqtt] {
            match outcome {
                Ok(mut found) => devices.append(&mut found),
                Err(e) => {
                    tracing::warn!(error = %e, "search driver failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(devices),
        }
    }
}
