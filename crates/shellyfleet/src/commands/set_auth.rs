//! `shelly set-auth`: set or clear device authentication.
//!
//! The password hash depends on the device id (which is also the auth
//! realm), so each device needs a `Shelly.GetDeviceInfo` round trip
//! before the `Shelly.SetAuth` request can be built.

use clap::{Arg, Command};
use serde_json::Value;

use shelly_catalog::build_set_auth_params;
use shelly_catalog::components::shelly::DeviceInfo;
use shelly_discovery::{run_on_all, DiscoveryError};
use shelly_rpc::executor;
use shelly_rpc::RpcError;

use crate::error::CliError;
use crate::flags::{self, Ctx, DiscoveryFlagOpts};
use crate::gen::prepare_devices;
use crate::output::Format;

pub fn command() -> Command {
    flags::discovery_flags(
        Command::new("set-auth")
            .about("Set or clear the authentication password on devices")
            .arg(
                Arg::new("password")
                    .long("password")
                    .help("password to use for auth. If empty, the password will be cleared"),
            ),
        DiscoveryFlagOpts::default(),
    )
}

pub async fn run(ctx: &Ctx<'_>, format: Format) -> Result<(), CliError> {
    let password = ctx
        .matches
        .get_one::<String>("password")
        .cloned()
        .filter(|p| !p.is_empty());

    let discoverer = prepare_devices(ctx).await?;
    let devices = discoverer.all_devices();
    if devices.is_empty() {
        tracing::warn!("no devices found or configured; nothing to do");
        return Ok(());
    }

    let concurrency = discoverer.config().concurrency;
    let skip_failed = ctx.flag("skip-failed-hosts");
    let outcomes = run_on_all(&devices, concurrency, skip_failed, move |device, channel| {
        let password = password.clone();
        async move {
            let opts = device.call_options();
            let raw = executor::call(&channel, "Shelly.GetDeviceInfo", None, &opts).await?;
            let info: DeviceInfo = serde_json::from_value(raw)
                .map_err(|e| RpcError::Malformed(format!("decoding device info: {e}")))?;

            let params = build_set_auth_params(&info.id, password.as_deref());
            tracing::info!(
                device = %device.best_name(),
                realm = %info.id,
                clearing = password.is_none(),
                "sending Shelly.SetAuth"
            );
            let result =
                executor::call(&channel, "Shelly.SetAuth", Some(params), &opts).await?;
            Ok::<Value, DiscoveryError>(result)
        }
    })
    .await?;

    for outcome in outcomes {
        format.emit(
            &format!(
                "Response to Shelly.SetAuth command for {}",
                outcome.device.best_name()
            ),
            "response",
            &outcome.value,
        );
    }
    Ok(())
}
