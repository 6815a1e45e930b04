//! BLE codec: mgRPC over the Mongoose GATT service.
//!
//! The device exposes three characteristics. TX-control takes the
//! big-endian u32 length of the next outbound frame, the data
//! characteristic carries frame bytes in both directions, and RX-control
//! yields the u32 length of the pending inbound frame. One call is:
//! write length, write frame (MTU-sized chunks), wait for the response
//! length on RX-control (notifications plus a 250 ms read poll; some host
//! stacks deliver one but not the other), then read exactly that many
//! bytes back off the data characteristic.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Uuid};
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::time::MissedTickBehavior;

use super::Codec;
use crate::error::RpcError;
use crate::frame::Frame;

/// `_mOS_RPC_SVC_ID_`
pub const RPC_SERVICE: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f53_56435f49445f);
/// `_mOS_RPC_data___`
pub const DATA_CHARACTERISTIC: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f64_6174615f5f5f);
/// `_mOS_RPC_tx_ctl_`
pub const TX_CONTROL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f74_785f63746c5f);
/// `_mOS_RPC_rx_ctl_`
pub const RX_CONTROL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f72_785f63746c5f);

/// Allterco Robotics LTD BLE company id.
pub const SHELLY_COMPANY_ID: u16 = 2985;

const RX_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on an inbound frame. Anything larger is a corrupt length
/// prefix, not a real response.
const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

// ── Adapter singleton ────────────────────────────────────────────────

/// Process-wide BLE adapter.
///
/// Enablement happens lazily exactly once; `scan_lock` serializes scan
/// start/stop between the search driver and per-device connect paths,
/// which some host stacks require.
pub struct BleCentral {
    adapter: OnceCell<Adapter>,
    scan_lock: Mutex<()>,
}

static CENTRAL: OnceLock<BleCentral> = OnceLock::new();

impl BleCentral {
    /// The process-wide instance.
    pub fn shared() -> &'static BleCentral {
        CENTRAL.get_or_init(|| BleCentral {
            adapter: OnceCell::new(),
            scan_lock: Mutex::new(()),
        })
    }

    /// Enable and return the adapter. Idempotent.
    pub async fn adapter(&self) -> Result<&Adapter, RpcError> {
        self.adapter
            .get_or_try_init(|| async {
                let adapter = Adapter::default()
                    .await
                    .ok_or_else(|| RpcError::Unreachable("no BLE adapter present".into()))?;
                adapter
                    .wait_available()
                    .await
                    .map_err(|e| RpcError::Unreachable(format!("BLE adapter unavailable: {e}")))?;
                tracing::debug!("BLE adapter enabled");
                Ok(adapter)
            })
            .await
    }

    /// Hold this while starting or stopping a scan.
    pub async fn scan_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.scan_lock.lock().await
    }

    /// Scan until a device advertising `mac` appears, then connect to it.
    pub async fn find_and_connect(
        &self,
        mac: &str,
        timeout: Duration,
    ) -> Result<bluest::Device, RpcError> {
        let adapter = self.adapter().await?;
        let _guard = self.scan_guard().await;
        let wanted = normalize_mac(mac);

        let scan = adapter
            .scan(&[])
            .await
            .map_err(|e| RpcError::Unreachable(format!("starting BLE scan: {e}")))?;
        let mut scan = std::pin::pin!(scan);

        let found = tokio::time::timeout(timeout, async {
            while let Some(discovered) = scan.next().await {
                let id = normalize_mac(&discovered.device.id().to_string());
                if id.ends_with(&wanted) {
                    return Some(discovered.device);
                }
            }
            None
        })
        .await
        .map_err(|_| RpcError::Unreachable(format!("BLE device {mac} not found in scan window")))?
        .ok_or_else(|| RpcError::Unreachable(format!("BLE scan ended before {mac} appeared")))?;

        adapter
            .connect_device(&found)
            .await
            .map_err(|e| RpcError::Unreachable(format!("connecting BLE device {mac}: {e}")))?;
        Ok(found)
    }
}

/// Upper-case hex with separators stripped, for MAC comparison across
/// host stacks that format device ids differently.
pub fn normalize_mac(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

// ── Codec ────────────────────────────────────────────────────────────

struct BleSession {
    device: bluest::Device,
    data: Characteristic,
    tx_ctl: Characteristic,
    rx_ctl: Characteristic,
}

pub struct BleCodec {
    mac: String,
    search_timeout: Duration,
    session: Mutex<Option<BleSession>>,
    // recv() only has work to do after a send(); tokens keep it from
    // spinning on RX-control while the channel is idle.
    pending_tx: mpsc::UnboundedSender<()>,
    pending_rx: Mutex<mpsc::UnboundedReceiver<()>>,
}

impl BleCodec {
    /// Codec for a device not yet connected; `open` scans for the MAC.
    pub fn new(mac: impl Into<String>, search_timeout: Duration) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        Self {
            mac: mac.into(),
            search_timeout,
            session: Mutex::new(None),
            pending_tx,
            pending_rx: Mutex::new(pending_rx),
        }
    }

    /// Codec over a device the search driver already connected. Some host
    /// stacks only allow connecting while the scan that produced the
    /// result is still running, so the driver connects eagerly and hands
    /// the live connection over.
    pub async fn attach(
        mac: impl Into<String>,
        device: bluest::Device,
        search_timeout: Duration,
    ) -> Result<Self, RpcError> {
        let codec = Self::new(mac, search_timeout);
        let session = Self::discover_session(device).await?;
        *codec.session.lock().await = Some(session);
        Ok(codec)
    }

    /// Connect and resolve the GATT session. No-op when already connected.
    pub async fn open(&self) -> Result<(), RpcError> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            tracing::debug!(mac = %self.mac, "BLE device already connected");
            return Ok(());
        }
        let device = BleCentral::shared()
            .find_and_connect(&self.mac, self.search_timeout)
            .await?;
        *slot = Some(Self::discover_session(device).await?);
        tracing::info!(mac = %self.mac, "connected to BLE device");
        Ok(())
    }

    async fn discover_session(device: bluest::Device) -> Result<BleSession, RpcError> {
        let services = device
            .discover_services_with_uuid(RPC_SERVICE)
            .await
            .map_err(|e| RpcError::Unreachable(format!("discovering BLE services: {e}")))?;
        let service = services
            .first()
            .ok_or_else(|| RpcError::Unreachable("device lacks the RPC GATT service".into()))?;

        let characteristics = service
            .discover_characteristics()
            .await
            .map_err(|e| RpcError::Unreachable(format!("discovering characteristics: {e}")))?;

        let mut data = None;
        let mut tx_ctl = None;
        let mut rx_ctl = None;
        for characteristic in characteristics {
            match characteristic.uuid() {
                DATA_CHARACTERISTIC => data = Some(characteristic),
                TX_CONTROL_CHARACTERISTIC => tx_ctl = Some(characteristic),
                RX_CONTROL_CHARACTERISTIC => rx_ctl = Some(characteristic),
                _ => {}
            }
        }
        let missing =
            |name: &str| RpcError::Unreachable(format!("RPC service is missing {name} characteristic"));
        Ok(BleSession {
            device,
            data: data.ok_or_else(|| missing("data"))?,
            tx_ctl: tx_ctl.ok_or_else(|| missing("tx-control"))?,
            rx_ctl: rx_ctl.ok_or_else(|| missing("rx-control"))?,
        })
    }
}

#[async_trait]
impl Codec for BleCodec {
    async fn send(&self, frame: Frame) -> Result<(), RpcError> {
        self.open().await?;
        let slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(RpcError::Closed)?;

        let payload = serde_json::to_vec(&frame)
            .map_err(|e| RpcError::Malformed(format!("encoding frame: {e}")))?;

        let length_prefix = (payload.len() as u32).to_be_bytes();
        session
            .tx_ctl
            .write_without_response(&length_prefix)
            .await
            .map_err(|e| RpcError::Unreachable(format!("writing tx length: {e}")))?;

        let mtu = session.data.max_write_len().unwrap_or(20).max(1);
        for chunk in payload.chunks(mtu) {
            session
                .data
                .write_without_response(chunk)
                .await
                .map_err(|e| RpcError::Unreachable(format!("writing frame chunk: {e}")))?;
        }
        tracing::debug!(mac = %self.mac, len = payload.len(), mtu, "sent BLE frame");

        let _ = self.pending_tx.send(());
        Ok(())
    }

    async fn recv(&self) -> Result<Frame, RpcError> {
        // Wait until a request is actually in flight.
        {
            let mut pending = self.pending_rx.lock().await;
            pending.recv().await.ok_or(RpcError::Closed)?;
        }

        let slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(RpcError::Closed)?;

        // The response length arrives on RX-control. Subscribe for
        // notifications but also poll with a read; neither path is
        // reliable alone on every host stack.
        let notifications = session
            .rx_ctl
            .notify()
            .await
            .map_err(|e| RpcError::Unreachable(format!("enabling rx notifications: {e}")))?;
        let mut notifications = std::pin::pin!(notifications);

        let mut ticker = tokio::time::interval(RX_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let length_raw: [u8; 4] = loop {
            tokio::select! {
                notified = notifications.next() => {
                    if let Some(Ok(buf)) = notified {
                        if let Ok(bytes) = <[u8; 4]>::try_from(buf.as_slice()) {
                            break bytes;
                        }
                        tracing::debug!(len = buf.len(), "short rx-control notification");
                    }
                }
                _ = ticker.tick() => {
                    match session.rx_ctl.read().await {
                        Ok(buf) => {
                            if let Ok(bytes) = <[u8; 4]>::try_from(buf.as_slice()) {
                                break bytes;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "rx-control read failed, will retry"),
                    }
                }
            }
        };
        drop(notifications); // disables notifications

        let response_len = u32::from_be_bytes(length_raw);
        if response_len == 0 || response_len > MAX_FRAME_LEN {
            return Err(RpcError::Malformed(format!(
                "impossible BLE frame length {response_len}"
            )));
        }

        let mut buf: Vec<u8> = Vec::with_capacity(response_len as usize);
        while buf.len() < response_len as usize {
            let chunk = session
                .data
                .read()
                .await
                .map_err(|e| RpcError::Unreachable(format!("reading response chunk: {e}")))?;
            if chunk.is_empty() {
                return Err(RpcError::Malformed(
                    "BLE data characteristic returned no bytes mid-frame".into(),
                ));
            }
            buf.extend_from_slice(&chunk);
        }
        if buf.len() != response_len as usize {
            return Err(RpcError::Malformed(format!(
                "BLE frame over-read: got {} bytes, length prefix said {response_len}",
                buf.len()
            )));
        }

        serde_json::from_slice(&buf)
            .map_err(|e| RpcError::Malformed(format!("parsing BLE response frame: {e}")))
    }

    async fn close(&self) {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            return; // already closed
        };
        if let Ok(adapter) = BleCentral::shared().adapter().await {
            if let Err(e) = adapter.disconnect_device(&session.device).await {
                tracing::warn!(mac = %self.mac, error = %e, "BLE disconnect failed");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .try_lock()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_normalization_tolerates_separator_styles() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("aabbccddeeff"), "AABBCCDDEEFF");
    }

    #[test]
    fn gatt_uuids_spell_the_mongoose_names() {
        // The service UUIDs are ASCII: "_mOS_RPC_SVC_ID_" etc.
        assert_eq!(RPC_SERVICE.as_bytes(), b"_mOS_RPC_SVC_ID_");
        assert_eq!(DATA_CHARACTERISTIC.as_bytes(), b"_mOS_RPC_data___");
        assert_eq!(TX_CONTROL_CHARACTERISTIC.as_bytes(), b"_mOS_RPC_tx_ctl_");
        assert_eq!(RX_CONTROL_CHARACTERISTIC.as_bytes(), b"_mOS_RPC_rx_ctl_");
    }

    #[test]
    fn length_prefix_is_big_endian() {
        assert_eq!(123u32.to_be_bytes(), [0x00, 0x00, 0x00, 0x7B]);
        assert_eq!(u32::from_be_bytes([0x00, 0x00, 0x01, 0xC8]), 456);
    }
}
