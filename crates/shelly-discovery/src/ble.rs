//! BLE advertising search driver.
//!
//! Some host stacks only allow connecting to a scan result while the
//! scan that produced it is still running, so the scan outlives the
//! search window: after the timeout new advertisements are dropped, but
//! candidates already approved keep being connected and opened. Only
//! when the approver has drained does the scan stop. The phases are
//! Scanning → Draining → Stopped, and stopping is never allowed to skip
//! the drain.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use shelly_rpc::codec::ble::{normalize_mac, BleCentral, BleCodec, SHELLY_COMPANY_ID};

use crate::approve::Approver;
use crate::device::{ChannelUri, Device, DeviceSource};
use crate::discoverer::Discoverer;
use crate::error::DiscoveryError;

struct BleCandidate {
    device: bluest::Device,
    mac: String,
    name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Scanning,
    Draining,
    Stopped,
}

impl Discoverer {
    pub(crate) async fn search_ble(
        self: &Arc<Self>,
        stop: &CancellationToken,
    ) -> Result<Vec<Arc<Device>>, DiscoveryError> {
        if self.config.ble.is_none() {
            return Ok(Vec::new());
        }

        let central = BleCentral::shared();
        let adapter = central.adapter().await?;
        // Serializes scan start/stop against per-device open paths.
        let _scan_guard = central.scan_guard().await;

        let approver = Arc::new(Approver::<BleCandidate>::new(
            self.gate.clone(),
            stop.clone(),
        ));
        let confirm_loop = {
            let approver = Arc::clone(&approver);
            tokio::spawn(async move { approver.run().await })
        };

        // Approved candidates are connected and opened while the scan is
        // still running.
        let found: Arc<Mutex<Vec<Arc<Device>>>> = Arc::new(Mutex::new(Vec::new()));
        let consumer = {
            let approver = Arc::clone(&approver);
            let discoverer = Arc::clone(self);
            let found = Arc::clone(&found);
            tokio::spawn(async move {
                while let Some(candidate) = approver.get_approved().await {
                    match discoverer.open_ble_candidate(candidate).await {
                        Ok(Some(device)) => found.lock().await.push(device),
                        Ok(None) => {} // already known
                        Err(e) => {
                            tracing::warn!(error = %e, "found BLE device, but open failed");
                        }
                    }
                }
            })
        };

        tracing::debug!("starting BLE scan");
        let scan = adapter
            .scan(&[])
            .await
            .map_err(|e| shelly_rpc::RpcError::Unreachable(format!("starting BLE scan: {e}")))?;
        let mut scan = std::pin::pin!(scan);

        let mut phase = ScanPhase::Scanning;
        // MAC → had the Shelly vendor id. Advertisements repeat; both
        // kinds are only worth handling once.
        let mut seen: HashMap<String, bool> = HashMap::new();
        let deadline = tokio::time::Instant::now() + self.config.search_timeout;

        while phase == ScanPhase::Scanning {
            tokio::select! {
                biased;
                _ = stop.cancelled() => phase = ScanPhase::Draining,
                _ = tokio::time::sleep_until(deadline) => phase = ScanPhase::Draining,
                advertisement = scan.next() => {
                    let Some(advertisement) = advertisement else {
                        phase = ScanPhase::Draining;
                        continue;
                    };
                    let mac = normalize_mac(&advertisement.device.id().to_string());
                    let was_shelly = seen.get(&mac).copied();
                    if was_shelly == Some(true) {
                        // Already queued, approved, or rejected.
                        continue;
                    }
                    let is_shelly = advertisement
                        .adv_data
                        .manufacturer_data
                        .as_ref()
                        .is_some_and(|m| m.company_id == SHELLY_COMPANY_ID);
                    if !is_shelly {
                        if was_shelly.is_none() {
                            tracing::debug!(ble_address = %mac, "found non-shelly device");
                            seen.insert(mac, false);
                        }
                        continue;
                    }
                    if self.is_known_device(&mac) {
                        seen.insert(mac, true);
                        continue;
                    }
                    let name = advertisement.adv_data.local_name.clone();
                    let description = format!(
                        "BLE device {:?} ({mac})",
                        name.clone().unwrap_or_default()
                    );
                    approver
                        .submit(
                            BleCandidate {
                                device: advertisement.device,
                                mac: mac.clone(),
                                name,
                            },
                            description,
                        )
                        .await;
                    seen.insert(mac, true);
                }
            }
        }

        // Drain: no new advertisements, but approved candidates still
        // connect while the scan stays alive underneath them.
        approver.done();
        let confirm_result = confirm_loop.await;
        let _ = consumer.await;
        drop(scan); // stops discovery
        phase = ScanPhase::Stopped;
        tracing::debug!(?phase, "stopped BLE scan");

        match confirm_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(join_error) => {
                return Err(DiscoveryError::Prompt(format!(
                    "confirmation loop panicked: {join_error}"
                )))
            }
        }

        let found = Arc::try_unwrap(found)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        Ok(found)
    }

    /// Connect an approved scan result, adopt the live session into a
    /// device, and install it. Returns `None` when the MAC was already
    /// registered.
    async fn open_ble_candidate(
        self: &Arc<Self>,
        candidate: BleCandidate,
    ) -> Result<Option<Arc<Device>>, DiscoveryError> {
        let central = BleCentral::shared();
        let adapter = central.adapter().await?;
        tracing::debug!(mac = %candidate.mac, "connecting to BLE device");
        adapter
            .connect_device(&candidate.device)
            .await
            .map_err(|e| {
                shelly_rpc::RpcError::Unreachable(format!(
                    "found device, but failed to connect: {e}"
                ))
            })?;

        let codec = Arc::new(
            BleCodec::attach(
                candidate.mac.clone(),
                candidate.device,
                self.config.search_timeout,
            )
            .await?,
        );

        let device = Device::new(
            ChannelUri::Ble(candidate.mac.clone()),
            DeviceSource::Ble,
            Arc::clone(&self.ctx),
            self.config.default_auth.clone(),
        );
        device.set_mac(&candidate.mac);
        if let Some(name) = candidate.name {
            device.set_name(name);
        }
        device.adopt_ble_codec(codec).await;

        let (device, is_new) = self.add_device(device);
        Ok(is_new.then_some(device))
    }
}
