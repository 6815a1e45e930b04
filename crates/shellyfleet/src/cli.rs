//! Root command tree.

use clap::{Arg, Command};

use crate::commands::{prometheus, set_auth, watch};
use crate::data;
use crate::gen;

pub fn build() -> Command {
    let mut root = Command::new("shellyfleet")
        .version(env!("CARGO_PKG_VERSION"))
        .about("shellyfleet provides a CLI for discovering and working with Shelly gen2/gen3 devices")
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("threshold for outputting logs: trace, debug, info, warn, error")
                .env("SHELLYFLEET_LOG_LEVEL")
                .default_value("warn")
                .global(true),
        )
        .arg(
            Arg::new("output-format")
                .long("output-format")
                .short('o')
                .help("desired output format: json, min-json, yaml, text, log")
                .env("SHELLYFLEET_OUTPUT_FORMAT")
                .default_value("text")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("path to config file. Format is determined by extension (.yaml, .json, .toml valid)")
                .env("SHELLYFLEET_CONFIG")
                .global(true),
        )
        .arg(
            Arg::new("rpc-timeout")
                .long("rpc-timeout")
                .help("timeout in seconds for individual RPC requests. NOTE: with mqtt-retained configurations, raise this to the device's wake period")
                .env("SHELLYFLEET_RPC_TIMEOUT")
                .value_parser(clap::value_parser!(f64))
                .default_value("30")
                .global(true),
        );

    for &component in shelly_catalog::all_components() {
        let mut cmd = gen::component_command(component);
        match component.name {
            "shelly" => {
                cmd = cmd.subcommand(set_auth::command());
                for spec in data::SHELLY_DATA_COMMANDS {
                    cmd = cmd.subcommand(data::command(spec));
                }
            }
            "script" => {
                for spec in data::SCRIPT_DATA_COMMANDS {
                    cmd = cmd.subcommand(data::command(spec));
                }
            }
            _ => {}
        }
        root = root.subcommand(cmd);
    }

    root.subcommand(watch::command())
        .subcommand(prometheus::command())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tree_is_well_formed() {
        build().debug_assert();
    }

    #[test]
    fn generated_and_special_commands_coexist() {
        let root = build();
        let shelly = root
            .get_subcommands()
            .find(|c| c.get_name() == "shelly")
            .unwrap();
        let names: Vec<_> = shelly.get_subcommands().map(|c| c.get_name()).collect();
        assert!(names.contains(&"get-device-info"));
        assert!(names.contains(&"set-auth"));
        assert!(names.contains(&"put-user-ca"));
        assert!(names.contains(&"reset-wifi-config"));
    }
}
