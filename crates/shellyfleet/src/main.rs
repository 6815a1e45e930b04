mod cli;
mod commands;
mod data;
mod error;
mod flags;
mod gen;
mod metrics;
mod output;
mod prompt;

use std::str::FromStr;

use clap::ArgMatches;
use tracing_subscriber::EnvFilter;

use crate::commands::{prometheus, set_auth, watch};
use crate::error::CliError;
use crate::flags::Ctx;
use crate::output::Format;

#[tokio::main]
async fn main() {
    let matches = cli::build().get_matches();

    if let Err(e) = init_tracing(&matches) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run(&matches).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(matches: &ArgMatches) -> Result<(), CliError> {
    let level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("warn")
        .to_lowercase();
    let directive = match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        // zerolog-style aliases from the Go ecosystem.
        "fatal" | "panic" => "error".to_string(),
        other => return Err(CliError::Flag(format!("unknown value {other:?} for --log-level"))),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

async fn run(matches: &ArgMatches) -> Result<(), CliError> {
    let Some((name, sub_matches)) = matches.subcommand() else {
        return Ok(());
    };

    let file = match sub_matches.get_one::<String>("config") {
        Some(path) => flags::load_config_file(path)?,
        None => serde_json::Map::new(),
    };
    let ctx = Ctx::new(sub_matches, file);
    let format = Format::from_str(
        ctx.string("output-format")
            .as_deref()
            .unwrap_or("text"),
    )?;

    match name {
        "watch" => return watch::run(&ctx, format).await,
        "prometheus" => return prometheus::run(&ctx).await,
        _ => {}
    }

    // Component → RPC dispatch.
    let component = shelly_catalog::all_components()
        .iter()
        .find(|c| c.name == name)
        .copied()
        .ok_or_else(|| CliError::Flag(format!("unknown command {name:?}")))?;
    let Some((rpc_name, rpc_matches)) = sub_matches.subcommand() else {
        return Ok(());
    };
    let rpc_ctx = Ctx::new(rpc_matches, ctx.file.clone());

    // Hand-written subcommands first.
    if component.name == "shelly" {
        if rpc_name == "set-auth" {
            return set_auth::run(&rpc_ctx, format).await;
        }
        if let Some(spec) = data::SHELLY_DATA_COMMANDS.iter().find(|s| s.name == rpc_name) {
            return data::run(spec, &rpc_ctx, format).await;
        }
    }
    if component.name == "script" {
        if let Some(spec) = data::SCRIPT_DATA_COMMANDS.iter().find(|s| s.name == rpc_name) {
            return data::run(spec, &rpc_ctx, format).await;
        }
    }

    let request = component
        .requests
        .iter()
        .find(|request| {
            let (primary, alias) = gen::subcommand_name(request);
            primary == rpc_name || alias.as_deref() == Some(rpc_name)
        })
        .ok_or_else(|| CliError::Flag(format!("unknown {name} subcommand {rpc_name:?}")))?;

    gen::run_rpc(request, &rpc_ctx, format).await
}
