//! `prometheus`: serve device health as Prometheus scrapes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Arg, Command};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use shelly_discovery::{run_on_all, Discoverer};
use shelly_rpc::executor::{self, CallOptions};

use crate::error::CliError;
use crate::flags::{self, Ctx, DiscoveryFlagOpts};
use crate::metrics::{self, DeviceStatus, NotificationCache};

const NOTIFICATION_BUFFER: usize = 50;

pub fn command() -> Command {
    let cmd = Command::new("prometheus")
        .alias("prom")
        .about("Host a prometheus metrics exporter for shelly devices")
        .arg(
            Arg::new("bind-addr")
                .long("bind-addr")
                .help("local ip address to bind the metrics server to")
                .default_value("::"),
        )
        .arg(
            Arg::new("bind-port")
                .long("bind-port")
                .help("port to bind the metrics server")
                .value_parser(clap::value_parser!(u16))
                .default_value("8080"),
        )
        .arg(
            Arg::new("prometheus-namespace")
                .long("prometheus-namespace")
                .help("namespace string to use for prometheus metric names")
                .default_value(metrics::DEFAULT_NAMESPACE),
        )
        .arg(
            Arg::new("prometheus-subsystem")
                .long("prometheus-subsystem")
                .help("subsystem section of the prometheus metric names")
                .default_value(metrics::DEFAULT_SUBSYSTEM),
        )
        .arg(
            Arg::new("probe-concurrency")
                .long("probe-concurrency")
                .help("number of concurrent probes made to service a metrics request")
                .value_parser(clap::value_parser!(u64))
                .default_value("5"),
        )
        .arg(
            Arg::new("device-timeout")
                .long("device-timeout")
                .help("maximum time in seconds allowed for a device to respond to its probe")
                .value_parser(clap::value_parser!(f64))
                .default_value("5"),
        )
        .arg(
            Arg::new("scrape-duration-warning")
                .long("scrape-duration-warning")
                .help("scrapes exceeding this duration in seconds log a warning. The default 8s is 80% of the default prometheus scrape_timeout")
                .value_parser(clap::value_parser!(f64))
                .default_value("8"),
        );
    flags::discovery_flags(
        cmd,
        DiscoveryFlagOpts {
            with_ttl: true,
            interactive: false,
            strict_timeout: true,
        },
    )
}

struct ServerState {
    discoverer: Arc<Discoverer>,
    cache: Arc<NotificationCache>,
    namespace: String,
    subsystem: String,
    probe_concurrency: usize,
    device_timeout: Duration,
    scrape_duration_warning: Duration,
}

pub async fn run(ctx: &Ctx<'_>) -> Result<(), CliError> {
    let config = flags::discoverer_config(ctx)?;
    let search_enabled =
        config.mdns.is_some() || config.ble.is_some() || config.mqtt.as_ref().is_some_and(|m| m.search);
    let discoverer = Discoverer::new(config);

    // Notifications feed the cache so MQTT-only devices show up without
    // being probed.
    let cache = Arc::new(NotificationCache::new(metrics::DEFAULT_CACHE_TTL));
    let mut full_status_rx = discoverer
        .bus()
        .full_status_notifications(NOTIFICATION_BUFFER)
        .await
        .expect("first subscriber");
    let mut status_rx = discoverer
        .bus()
        .status_notifications(NOTIFICATION_BUFFER)
        .await
        .expect("first subscriber");
    {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    n = full_status_rx.recv() => n,
                    n = status_rx.recv() => n,
                };
                match notification {
                    Some(n) => cache.push(n),
                    None => return,
                }
            }
        });
    }

    discoverer.connect_mqtt().await?;
    flags::add_flag_devices(&discoverer, ctx).await?;

    let state = Arc::new(ServerState {
        discoverer,
        cache,
        namespace: ctx
            .string("prometheus-namespace")
            .unwrap_or_else(|| metrics::DEFAULT_NAMESPACE.into()),
        subsystem: ctx
            .string("prometheus-subsystem")
            .unwrap_or_else(|| metrics::DEFAULT_SUBSYSTEM.into()),
        probe_concurrency: ctx.count("probe-concurrency").unwrap_or(5),
        device_timeout: ctx
            .seconds("device-timeout")
            .unwrap_or(Duration::from_secs(5)),
        scrape_duration_warning: ctx
            .seconds("scrape-duration-warning")
            .unwrap_or(Duration::from_secs(8)),
    });
    let search_state = (search_enabled, Arc::clone(&state));

    let bind_addr = ctx.string("bind-addr").unwrap_or_else(|| "::".into());
    let bind_port = ctx
        .matches
        .get_one::<u16>("bind-port")
        .copied()
        .unwrap_or(8080);
    let listener = TcpListener::bind((bind_addr.as_str(), bind_port))
        .await
        .map_err(|e| CliError::io(format!("binding {bind_addr}:{bind_port}"), e))?;
    tracing::info!(bind_address = %format!("{bind_addr}:{bind_port}"), "starting metrics server");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down metrics server");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                tracing::debug!(peer = %peer, "serving metrics request");
                let (search_enabled, state) = (search_state.0, Arc::clone(&search_state.1));
                tokio::spawn(async move {
                    if let Err(e) = serve_scrape(stream, search_enabled, state).await {
                        tracing::warn!(error = %e, "metrics request failed");
                    }
                });
            }
        }
    }
}

async fn serve_scrape(
    mut stream: tokio::net::TcpStream,
    search_enabled: bool,
    state: Arc<ServerState>,
) -> std::io::Result<()> {
    // Drain the request head; the path does not matter, every scrape
    // gets the full exposition.
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() > 16 * 1024 {
            break;
        }
    }

    let body = scrape(search_enabled, &state).await;
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain; version=0.0.4; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

async fn scrape(search_enabled: bool, state: &ServerState) -> String {
    let started = Instant::now();

    if search_enabled {
        if let Err(e) = state.discoverer.search().await {
            tracing::warn!(error = %e, "search during scrape failed");
        }
    }
    state.discoverer.evict_expired();

    // Probe every known device; failures just mean absent series.
    let devices = state.discoverer.all_devices();
    let device_timeout = state.device_timeout;
    let probed = run_on_all(
        &devices,
        state.probe_concurrency,
        true,
        move |device, channel| async move {
            let opts = CallOptions {
                timeout: Some(device_timeout),
                ..device.call_options()
            };
            let status = executor::call(&channel, "Shelly.GetStatus", None, &opts).await?;
            Ok::<Value, shelly_discovery::DiscoveryError>(status)
        },
    )
    .await
    .unwrap_or_default();

    let mut statuses: Vec<DeviceStatus> = probed
        .into_iter()
        .map(|outcome| DeviceStatus {
            instance: outcome.device.uri().to_string(),
            device_name: outcome.device.name().unwrap_or_default(),
            mac: outcome.device.mac().unwrap_or_default(),
            components: outcome.value,
        })
        .collect();

    // Cached notifications cover devices that push rather than answer
    // probes (sleepy battery devices on MQTT).
    for notification in state.cache.snapshot() {
        statuses.push(DeviceStatus {
            instance: notification.frame.src.clone(),
            device_name: String::new(),
            mac: String::new(),
            components: serde_json::to_value(&notification.status.components)
                .unwrap_or_default(),
        });
    }

    let body = metrics::render(&state.namespace, &state.subsystem, &statuses);

    let elapsed = started.elapsed();
    if elapsed > state.scrape_duration_warning {
        tracing::warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            "scrape exceeded the duration warning threshold"
        );
    }
    body
}
