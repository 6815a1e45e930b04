//! `watch`: stream status notifications to the output formatter.

use clap::Command;

use shelly_discovery::Discoverer;

use crate::error::CliError;
use crate::flags::{self, Ctx, DiscoveryFlagOpts};
use crate::output::Format;

const NOTIFICATION_BUFFER: usize = 50;

pub fn command() -> Command {
    flags::discovery_flags(
        Command::new("watch").about("Subscribe to status notifications (via MQTT)"),
        DiscoveryFlagOpts {
            with_ttl: true,
            interactive: false,
            strict_timeout: true,
        },
    )
}

pub async fn run(ctx: &Ctx<'_>, format: Format) -> Result<(), CliError> {
    let config = flags::discoverer_config(ctx)?;
    let discoverer = Discoverer::new(config);

    // Subscribe before connecting so the very first notifications land
    // in the buffers instead of being dropped.
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

    discoverer.connect_mqtt().await?;
    flags::add_flag_devices(&discoverer, ctx).await?;
    discoverer.search().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down notification watch");
                return Ok(());
            }
            notification = full_status_rx.recv() => {
                let Some(n) = notification else { return Ok(()) };
                tracing::debug!(
                    src = %n.frame.src,
                    dst = %n.frame.dst,
                    "got NotifyFullStatus"
                );
                format.emit(
                    &format!("Received NotifyFullStatus frame from {}", n.frame.src),
                    "notification",
                    &serde_json::to_value(&n.status).expect("status serializes"),
                );
            }
            notification = status_rx.recv() => {
                let Some(n) = notification else { return Ok(()) };
                tracing::debug!(
                    src = %n.frame.src,
                    dst = %n.frame.dst,
                    "got NotifyStatus"
                );
                format.emit(
                    &format!("Received NotifyStatus frame from {}", n.frame.src),
                    "notification",
                    &serde_json::to_value(&n.status).expect("status serializes"),
                );
            }
        }
    }
}
