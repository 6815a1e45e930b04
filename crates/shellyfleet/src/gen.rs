//! Generated RPC commands: one subcommand per catalog request, flags
//! derived from the declarative field schema.

use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{json, Value};

use shelly_catalog::{set_path, ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};
use shelly_discovery::{run_on_all, Discoverer, DiscoveryError};
use shelly_rpc::executor;

use crate::error::CliError;
use crate::flags::{self, Ctx, DiscoveryFlagOpts};
use crate::output::Format;

/// Kebab-case a method suffix: `GetStatus` → `get-status`,
/// `ResetWiFiConfig` → `reset-wi-fi-config`.
pub fn kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower =
                i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = i + 1 < chars.len() && chars[i + 1].is_lowercase();
            if i > 0 && (prev_lower || (chars[i - 1].is_uppercase() && next_lower)) {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

/// Subcommand name + aliases for a request descriptor.
///
/// `WiFi` produces the awkward `wi-fi` segment; the pretty form wins and
/// the mechanical form stays as an alias.
pub fn subcommand_name(request: &RequestDescriptor) -> (String, Option<String>) {
    let suffix = request
        .method
        .split_once('.')
        .map(|(_, suffix)| suffix)
        .unwrap_or(request.method);
    let mechanical = kebab_case(suffix);
    if mechanical.contains("wi-fi") {
        (mechanical.replace("wi-fi", "wifi"), Some(mechanical))
    } else {
        (mechanical, None)
    }
}

fn field_arg(field: &FieldSpec) -> Arg {
    let name = field.flag_name();
    let mut arg = Arg::new(name.clone())
        .long(name)
        .help(field.help.to_string())
        .env(field.env_name());
    arg = match field.kind {
        FieldKind::Bool => arg
            .value_parser(clap::value_parser!(bool))
            .num_args(0..=1)
            .default_missing_value("true"),
        FieldKind::Int => arg.value_parser(clap::value_parser!(i64)),
        FieldKind::UInt => arg.value_parser(clap::value_parser!(u64)),
        FieldKind::Float => arg.value_parser(clap::value_parser!(f64)),
        FieldKind::String => arg,
        FieldKind::StringList => arg.action(ArgAction::Append),
        FieldKind::FloatList | FieldKind::NullableFloatList => arg
            .value_parser(clap::value_parser!(f64))
            .action(ArgAction::Append)
            .allow_negative_numbers(true),
    };
    if matches!(
        field.kind,
        FieldKind::Int | FieldKind::UInt | FieldKind::Float
    ) {
        arg = arg.allow_negative_numbers(true);
    }
    arg
}

/// Build the clap command for one component and its RPCs.
pub fn component_command(component: &'static ComponentCatalog) -> Command {
    let mut cmd = Command::new(component.name)
        .about(component.about)
        .subcommand_required(true)
        .arg_required_else_help(true);
    for request in component.requests {
        let (name, alias) = subcommand_name(request);
        let mut sub = Command::new(name).about(request.about);
        if let Some(alias) = alias {
            sub = sub.alias(alias);
        }
        for field in request.fields {
            sub = sub.arg(field_arg(field));
        }
        sub = flags::discovery_flags(sub, DiscoveryFlagOpts::default());
        cmd = cmd.subcommand(sub);
    }
    cmd
}

/// Assemble request params from explicitly-set field flags.
pub fn params_from_matches(
    fields: &'static [FieldSpec],
    matches: &ArgMatches,
) -> Result<Option<Value>, CliError> {
    let mut params = Value::Null;
    let mut any = false;
    for field in fields {
        let flag = field.flag_name();
        let explicit = matches!(
            matches.value_source(&flag),
            Some(clap::parser::ValueSource::CommandLine)
                | Some(clap::parser::ValueSource::EnvVariable)
        );
        if !explicit {
            continue;
        }
        let value = match field.kind {
            FieldKind::Bool => json!(matches.get_one::<bool>(&flag).copied().unwrap_or(true)),
            FieldKind::Int => json!(matches.get_one::<i64>(&flag).copied().unwrap_or_default()),
            FieldKind::UInt => json!(matches.get_one::<u64>(&flag).copied().unwrap_or_default()),
            FieldKind::Float => json!(matches.get_one::<f64>(&flag).copied().unwrap_or_default()),
            FieldKind::String => {
                json!(matches.get_one::<String>(&flag).cloned().unwrap_or_default())
            }
            FieldKind::StringList => {
                let values: Vec<String> = matches
                    .get_many::<String>(&flag)
                    .map(|v| v.cloned().collect())
                    .unwrap_or_default();
                json!(values)
            }
            FieldKind::FloatList => {
                let values: Vec<f64> = matches
                    .get_many::<f64>(&flag)
                    .map(|v| v.copied().collect())
                    .unwrap_or_default();
                json!(values)
            }
            FieldKind::NullableFloatList => {
                // NaN entries mean JSON null.
                let values: Vec<Option<f64>> = matches
                    .get_many::<f64>(&flag)
                    .map(|v| {
                        v.map(|f| if f.is_nan() { None } else { Some(*f) })
                            .collect()
                    })
                    .unwrap_or_default();
                json!(values)
            }
        };
        set_path(&mut params, field.path, value);
        any = true;
    }
    Ok(any.then_some(params))
}

/// Connect, search, and install flag-listed devices; the shared prelude
/// of every device-facing command.
pub async fn prepare_devices(ctx: &Ctx<'_>) -> Result<Arc<Discoverer>, CliError> {
    let config = flags::discoverer_config(ctx)?;
    let discoverer = Discoverer::new(config);
    discoverer.connect_mqtt().await?;
    discoverer.search().await?;
    flags::add_flag_devices(&discoverer, ctx).await?;
    Ok(discoverer)
}

/// Execute one generated RPC subcommand.
pub async fn run_rpc(
    request: &'static RequestDescriptor,
    ctx: &Ctx<'_>,
    format: Format,
) -> Result<(), CliError> {
    let params = params_from_matches(request.fields, ctx.matches)?;
    tracing::debug!(method = %request.method, params = ?params, "prepared request");

    let discoverer = prepare_devices(ctx).await?;
    let devices = discoverer.all_devices();
    if devices.is_empty() {
        tracing::warn!("no devices found or configured; nothing to do");
        return Ok(());
    }

    let concurrency = discoverer.config().concurrency;
    let skip_failed = ctx.flag("skip-failed-hosts");
    let outcomes = run_on_all(&devices, concurrency, skip_failed, move |device, channel| {
        let params = params.clone();
        async move {
            tracing::info!(
                device = %device.best_name(),
                method = %request.method,
                "sending request"
            );
            let raw = executor::call(&channel, request.method, params, &device.call_options())
                .await?;
            tracing::debug!(device = %device.best_name(), raw = %raw, "got raw response");
            let decoded = (request.decode)(raw).map_err(DiscoveryError::Catalog)?;
            Ok::<Value, DiscoveryError>(decoded)
        }
    })
    .await?;

    for outcome in outcomes {
        format.emit(
            &format!(
                "Response to {} command for {}",
                request.method,
                outcome.device.best_name()
            ),
            "response",
            &outcome.value,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_case_handles_camel_and_acronyms() {
        assert_eq!(kebab_case("GetStatus"), "get-status");
        assert_eq!(kebab_case("GoToPosition"), "go-to-position");
        assert_eq!(kebab_case("ResetWiFiConfig"), "reset-wi-fi-config");
        assert_eq!(kebab_case("GetDeviceInfo"), "get-device-info");
    }

    #[test]
    fn wifi_subcommand_gets_the_pretty_name() {
        let request = shelly_catalog::descriptor_for("Shelly.ResetWiFiConfig").unwrap();
        let (name, alias) = subcommand_name(request);
        assert_eq!(name, "reset-wifi-config");
        assert_eq!(alias.as_deref(), Some("reset-wi-fi-config"));
    }

    #[test]
    fn params_assemble_from_explicit_flags_only() {
        let request = shelly_catalog::descriptor_for("Switch.Set").unwrap();
        let cmd = Command::new("set");
        let cmd = request
            .fields
            .iter()
            .fold(cmd, |cmd, field| cmd.arg(field_arg(field)));

        let matches = cmd
            .clone()
            .try_get_matches_from(["set", "--id", "1", "--on"])
            .unwrap();
        let params = params_from_matches(request.fields, &matches).unwrap().unwrap();
        assert_eq!(params, serde_json::json!({"id": 1, "on": true}));

        // Nothing set → no params member at all.
        let matches = cmd.try_get_matches_from(["set"]).unwrap();
        assert!(params_from_matches(request.fields, &matches)
            .unwrap()
            .is_none());
    }

    #[test]
    fn config_prefix_is_stripped_from_generated_flags() {
        let request = shelly_catalog::descriptor_for("Switch.SetConfig").unwrap();
        let cmd = request
            .fields
            .iter()
            .fold(Command::new("set-config"), |cmd, field| {
                cmd.arg(field_arg(field))
            });
        let matches = cmd
            .try_get_matches_from(["set-config", "--id", "0", "--auto-off-delay", "30.5"])
            .unwrap();
        let params = params_from_matches(request.fields, &matches).unwrap().unwrap();
        assert_eq!(
            params,
            serde_json::json!({"id": 0, "config": {"auto_off_delay": 30.5}})
        );
    }

    #[test]
    fn every_component_builds_a_clap_command() {
        for &component in shelly_catalog::all_components() {
            let cmd = component_command(component);
            cmd.clone().debug_assert();
        }
    }
}
