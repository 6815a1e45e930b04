//! mDNS search driver.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::approve::Approver;
use crate::config::IpPreference;
use crate::device::{Device, DeviceSource};
use crate::discoverer::Discoverer;
use crate::error::DiscoveryError;

// Candidate is the probe URL; the human description rides separately
// through the approver.
type MdnsCandidate = String;

/// Resolve a hostname inside the mDNS zone (e.g. `dev1.local`) to an IP
/// address via multicast, not DNS.
pub(crate) async fn resolve_hostname(
    host: &str,
    timeout: Duration,
) -> Result<IpAddr, DiscoveryError> {
    let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
    let hostname = if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    };
    let receiver = daemon
        .resolve_hostname(&hostname, Some(timeout.as_millis() as u64))
        .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

    let result = tokio::time::timeout(timeout + Duration::from_millis(250), async {
        while let Ok(event) = receiver.recv_async().await {
            if let mdns_sd::HostnameResolutionEvent::AddressesFound(_, addresses) = event {
                if let Some(addr) = addresses.into_iter().next() {
                    return Some(addr);
                }
            }
        }
        None
    })
    .await;
    let _ = daemon.shutdown();

    match result {
        Ok(Some(addr)) => Ok(addr),
        _ => Err(DiscoveryError::Mdns(format!(
            "hostname {host} did not resolve within the search window"
        ))),
    }
}

impl Discoverer {
    /// One mDNS query for the configured service; responders flow
    /// through the approver and a bounded worker pool probes the
    /// approved ones so slow devices do not serialize discovery.
    pub(crate) async fn search_mdns(
        self: &Arc<Self>,
        stop: &CancellationToken,
    ) -> Result<Vec<Arc<Device>>, DiscoveryError> {
        let Some(mdns_config) = self.config.mdns.clone() else {
            return Ok(Vec::new());
        };

        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        match self.config.prefer_ip {
            IpPreference::V4 => {
                let _ = daemon.disable_interface(IfKind::IPv6);
            }
            IpPreference::V6 => {
                let _ = daemon.disable_interface(IfKind::IPv4);
            }
            IpPreference::Any => {}
        }
        if let Some(interface) = &mdns_config.interface {
            daemon
                .disable_interface(IfKind::All)
                .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
            daemon
                .enable_interface(IfKind::Name(interface.clone()))
                .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        }

        let service_type = format!("{}.{}.", mdns_config.service, self.config.mdns_zone);
        tracing::debug!(service = %service_type, "starting mDNS search");
        let receiver = daemon
            .browse(&service_type)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        let approver = Arc::new(Approver::<MdnsCandidate>::new(
            self.gate.clone(),
            stop.clone(),
        ));
        let confirm_loop = {
            let approver = Arc::clone(&approver);
            tokio::spawn(async move { approver.run().await })
        };

        // Approved candidates are probed in parallel, bounded by the
        // discovery concurrency.
        let deadline = tokio::time::Instant::now() + self.config.search_timeout;
        let found: Arc<Mutex<Vec<Arc<Device>>>> = Arc::new(Mutex::new(Vec::new()));
        let consumer = {
            let approver = Arc::clone(&approver);
            let discoverer = Arc::clone(self);
            let found = Arc::clone(&found);
            let strict = self.config.strict_search_timeout;
            let workers = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
            tokio::spawn(async move {
                let mut probes = tokio::task::JoinSet::new();
                while let Some(candidate) = approver.get_approved().await {
                    let permit = Arc::clone(&workers)
                        .acquire_owned()
                        .await
                        .expect("worker semaphore closed");
                    let discoverer = Arc::clone(&discoverer);
                    let found = Arc::clone(&found);
                    probes.spawn(async move {
                        let _permit = permit;
                        let probe =
                            discoverer.add_device_by_address_from(&candidate, DeviceSource::Mdns);
                        let outcome = if strict {
                            match tokio::time::timeout_at(deadline, probe).await {
                                Ok(outcome) => outcome,
                                Err(_) => {
                                    tracing::warn!(
                                        addr = %candidate,
                                        "probe missed the strict search window; ignoring device"
                                    );
                                    return;
                                }
                            }
                        } else {
                            probe.await
                        };
                        match outcome {
                            Ok(device) => found.lock().await.push(device),
                            Err(e) => {
                                tracing::error!(addr = %candidate, error = %e, "adding device");
                            }
                        }
                    });
                }
                while probes.join_next().await.is_some() {}
            })
        };

        // Collect responses for the search window.
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => break,
                event = receiver.recv_async() => match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if let Some((url, description)) = self.mdns_candidate(&info) {
                            approver.submit(url, description).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "mDNS event stream ended");
                        break;
                    }
                }
            }
        }

        approver.done();
        let confirm_result = confirm_loop.await;
        let _ = consumer.await;
        let _ = daemon.shutdown();

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

    /// Validate one resolved service entry and shape it into a
    /// candidate. Entries without a supported `gen` TXT value are
    /// skipped with a warning.
    fn mdns_candidate(&self, info: &ServiceInfo) -> Option<(MdnsCandidate, String)> {
        let addresses = info.get_addresses();
        let address = match self.config.prefer_ip {
            IpPreference::V6 => addresses
                .iter()
                .find(|a| a.is_ipv6())
                .or_else(|| addresses.iter().next()),
            IpPreference::V4 => addresses
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addresses.iter().next()),
            IpPreference::Any => addresses
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addresses.iter().next()),
        };
        let Some(address) = address else {
            tracing::warn!(
                mdns_name = %info.get_fullname(),
                "mDNS advertisement without a usable address"
            );
            return None;
        };

        match info.get_property_val_str("gen") {
            Some("2") | Some("3") => {}
            Some(gen) => {
                tracing::warn!(
                    mdns_name = %info.get_fullname(),
                    gen = %gen,
                    "unsupported device `gen`; skipping"
                );
                return None;
            }
            None => {
                tracing::warn!(
                    mdns_name = %info.get_fullname(),
                    "mDNS record missing `gen` field; skipping"
                );
                return None;
            }
        }

        let host = match address {
            IpAddr::V4(v4) => format!("{v4}:{}", info.get_port()),
            IpAddr::V6(v6) => format!("[{v6}]:{}", info.get_port()),
        };
        let url = format!("http://{host}/rpc");
        let description = format!("mDNS device {:?} ({host})", info.get_fullname());
        Some((url, description))
    }
}
