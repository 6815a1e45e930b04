//! Bulk-data commands: certificate/key upload and script code upload.
//!
//! Payloads come from exactly one of a literal flag, a file (`-` for
//! stdin), or a URL; the buffered data is then streamed to each device
//! line by line, the first line with `append=false` and the rest with
//! `append=true`. Remove variants send a single null payload.

use clap::{Arg, ArgMatches, Command};
use serde_json::{json, Value};

use shelly_discovery::{run_on_all, DiscoveryError};
use shelly_rpc::executor;

use crate::error::CliError;
use crate::flags::{self, Ctx, DiscoveryFlagOpts};
use crate::gen::prepare_devices;
use crate::output::Format;

pub struct DataCommandSpec {
    pub name: &'static str,
    pub about: &'static str,
    pub method: &'static str,
    /// JSON key carrying the payload (`data` or `code`).
    pub payload_key: &'static str,
    pub str_param: &'static str,
    pub file_param: &'static str,
    pub url_param: &'static str,
    pub remove_param: Option<&'static str>,
    /// Whether the request addresses a component instance (`--id`).
    pub with_id: bool,
}

pub static SHELLY_DATA_COMMANDS: &[DataCommandSpec] = &[
    DataCommandSpec {
        name: "put-user-ca",
        about: "Upload a custom certificate authority bundle to devices",
        method: "Shelly.PutUserCA",
        payload_key: "data",
        str_param: "data",
        file_param: "data-file",
        url_param: "data-url",
        remove_param: Some("remove-ca"),
        with_id: false,
    },
    DataCommandSpec {
        name: "put-tls-client-cert",
        about: "Upload a TLS client certificate to devices",
        method: "Shelly.PutTLSClientCert",
        payload_key: "data",
        str_param: "data",
        file_param: "data-file",
        url_param: "data-url",
        remove_param: Some("remove-cert"),
        with_id: false,
    },
    DataCommandSpec {
        name: "put-tls-client-key",
        about: "Upload a TLS client key to devices",
        method: "Shelly.PutTLSClientKey",
        payload_key: "data",
        str_param: "data",
        file_param: "data-file",
        url_param: "data-url",
        remove_param: Some("remove-key"),
        with_id: false,
    },
];

pub static SCRIPT_DATA_COMMANDS: &[DataCommandSpec] = &[DataCommandSpec {
    name: "put-code",
    about: "Upload code to a script slot",
    method: "Script.PutCode",
    payload_key: "code",
    str_param: "code",
    file_param: "code-file",
    url_param: "code-url",
    remove_param: None,
    with_id: true,
}];

pub fn command(spec: &'static DataCommandSpec) -> Command {
    let mut cmd = Command::new(spec.name)
        .about(spec.about)
        .arg(
            Arg::new(spec.str_param)
                .long(spec.str_param)
                .help("payload as a literal argument"),
        )
        .arg(
            Arg::new(spec.file_param)
                .long(spec.file_param)
                .help("path to a file containing the payload. `-` reads stdin"),
        )
        .arg(
            Arg::new(spec.url_param)
                .long(spec.url_param)
                .help("URL to fetch the payload from"),
        );
    if let Some(remove) = spec.remove_param {
        cmd = cmd.arg(
            Arg::new(remove)
                .long(remove)
                .help("clear the existing data from the device")
                .value_parser(clap::value_parser!(bool))
                .num_args(0..=1)
                .default_missing_value("true")
                .default_value("false"),
        );
    }
    if spec.with_id {
        cmd = cmd.arg(
            Arg::new("id")
                .long("id")
                .help("Id of the script")
                .value_parser(clap::value_parser!(u64)),
        );
    }
    flags::discovery_flags(cmd, DiscoveryFlagOpts::default())
}

#[derive(Debug)]
enum Payload {
    Lines(String),
    Remove,
}

fn payload_params(
    spec: &DataCommandSpec,
    script_id: Option<u64>,
    payload: Value,
    append: bool,
) -> Value {
    let mut params = serde_json::Map::new();
    if let Some(id) = script_id {
        params.insert("id".into(), json!(id));
    }
    params.insert(spec.payload_key.to_string(), payload);
    params.insert("append".into(), json!(append));
    Value::Object(params)
}

async fn load_payload(
    spec: &DataCommandSpec,
    matches: &ArgMatches,
) -> Result<Payload, CliError> {
    let literal = matches.get_one::<String>(spec.str_param).cloned();
    let file = matches.get_one::<String>(spec.file_param).cloned();
    let url = matches.get_one::<String>(spec.url_param).cloned();
    let remove = spec
        .remove_param
        .map(|flag| matches.get_one::<bool>(flag).copied().unwrap_or(false))
        .unwrap_or(false);

    let sources =
        [literal.is_some(), file.is_some(), url.is_some(), remove].iter().filter(|s| **s).count();
    let fields = match spec.remove_param {
        Some(remove) => format!(
            "--{}, --{}, --{}, and --{}",
            spec.str_param, spec.file_param, spec.url_param, remove
        ),
        None => format!(
            "--{}, --{} and --{}",
            spec.str_param, spec.file_param, spec.url_param
        ),
    };
    if sources > 1 {
        return Err(CliError::Flag(format!("{fields} options are mutually exclusive")));
    }
    if sources == 0 {
        return Err(CliError::Flag(format!(
            "exactly one of {fields} options is required"
        )));
    }

    if remove {
        return Ok(Payload::Remove);
    }
    if let Some(data) = literal {
        return Ok(Payload::Lines(data));
    }
    if let Some(path) = file {
        let data = if path == "-" {
            use tokio::io::AsyncReadExt;
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .map_err(|e| CliError::io(format!("reading stdin for --{}", spec.str_param), e))?;
            buffer
        } else {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CliError::io(format!("reading --{} {path}", spec.file_param), e))?
        };
        return Ok(Payload::Lines(data));
    }
    let url = url.expect("one source is set");
    let response = reqwest::get(&url)
        .await
        .map_err(|e| CliError::Flag(format!("fetching --{} {url}: {e}", spec.url_param)))?;
    let data = response
        .text()
        .await
        .map_err(|e| CliError::Flag(format!("reading --{} {url}: {e}", spec.url_param)))?;
    Ok(Payload::Lines(data))
}

pub async fn run(
    spec: &'static DataCommandSpec,
    ctx: &Ctx<'_>,
    format: Format,
) -> Result<(), CliError> {
    let payload = load_payload(spec, ctx.matches).await?;
    let script_id = spec
        .with_id
        .then(|| ctx.matches.get_one::<u64>("id").copied())
        .flatten();

    let discoverer = prepare_devices(ctx).await?;
    let devices = discoverer.all_devices();
    if devices.is_empty() {
        tracing::warn!("no devices found or configured; nothing to do");
        return Ok(());
    }

    let lines: Option<Vec<String>> = match &payload {
        Payload::Remove => None,
        Payload::Lines(data) => Some(data.lines().map(str::to_string).collect()),
    };

    let concurrency = discoverer.config().concurrency;
    let skip_failed = ctx.flag("skip-failed-hosts");
    let outcomes = run_on_all(&devices, concurrency, skip_failed, move |device, channel| {
        let lines = lines.clone();
        async move {
            let opts = device.call_options();
            match lines {
                None => {
                    let params = payload_params(spec, script_id, Value::Null, false);
                    tracing::debug!(
                        device = %device.best_name(),
                        method = %spec.method,
                        "sending request to clear data"
                    );
                    let raw = executor::call(&channel, spec.method, Some(params), &opts).await?;
                    Ok::<Value, DiscoveryError>(raw)
                }
                Some(lines) => {
                    let mut last = Value::Null;
                    for (index, line) in lines.iter().enumerate() {
                        let params =
                            payload_params(spec, script_id, json!(line), index > 0);
                        tracing::debug!(
                            device = %device.best_name(),
                            method = %spec.method,
                            line = index + 1,
                            "sending data"
                        );
                        last = executor::call(&channel, spec.method, Some(params), &opts).await?;
                    }
                    Ok(last)
                }
            }
        }
    })
    .await?;

    for outcome in outcomes {
        format.emit(
            &format!(
                "Response to {} command for {}",
                spec.method,
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
    fn data_commands_build() {
        for spec in SHELLY_DATA_COMMANDS.iter().chain(SCRIPT_DATA_COMMANDS) {
            command(spec).debug_assert();
        }
    }

    #[tokio::test]
    async fn payload_sources_are_mutually_exclusive() {
        let spec = &SHELLY_DATA_COMMANDS[0];
        let matches = command(spec)
            .try_get_matches_from(["put-user-ca", "--data", "x", "--data-file", "y"])
            .unwrap();
        let err = load_payload(spec, &matches).await.unwrap_err();
        assert!(matches!(err, CliError::Flag(_)));
    }

    #[tokio::test]
    async fn missing_payload_source_is_an_error() {
        let spec = &SHELLY_DATA_COMMANDS[0];
        let matches = command(spec)
            .try_get_matches_from(["put-user-ca"])
            .unwrap();
        let err = load_payload(spec, &matches).await.unwrap_err();
        assert!(matches!(err, CliError::Flag(_)));
    }

    #[tokio::test]
    async fn remove_flag_selects_the_clearing_form() {
        let spec = &SHELLY_DATA_COMMANDS[0];
        let matches = command(spec)
            .try_get_matches_from(["put-user-ca", "--remove-ca"])
            .unwrap();
        assert!(matches!(
            load_payload(spec, &matches).await.unwrap(),
            Payload::Remove
        ));
    }
}
