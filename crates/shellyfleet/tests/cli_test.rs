//! End-to-end CLI surface tests: command tree shape and flag parsing,
//! no device traffic.

use assert_cmd::Command;
use predicates::prelude::*;

fn shellyfleet() -> Command {
    Command::cargo_bin("shellyfleet").expect("binary builds")
}

#[test]
fn root_help_lists_components_and_servers() {
    shellyfleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("switch"))
        .stdout(predicate::str::contains("cover"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("prometheus"));
}

#[test]
fn switch_set_exposes_schema_flags() {
    shellyfleet()
        .args(["switch", "set", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--id"))
        .stdout(predicate::str::contains("--on"))
        .stdout(predicate::str::contains("--toggle-after"))
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--skip-failed-hosts"));
}

#[test]
fn set_config_flags_drop_the_config_prefix() {
    shellyfleet()
        .args(["switch", "set-config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--auto-off-delay"))
        .stdout(predicate::str::contains("--power-limit"));
}

#[test]
fn shelly_component_carries_the_special_commands() {
    shellyfleet()
        .args(["shelly", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("set-auth"))
        .stdout(predicate::str::contains("put-user-ca"))
        .stdout(predicate::str::contains("put-tls-client-cert"))
        .stdout(predicate::str::contains("put-tls-client-key"));
}

#[test]
fn wifi_reset_uses_the_pretty_name() {
    shellyfleet()
        .args(["shelly", "reset-wifi-config", "--help"])
        .assert()
        .success();
    // The mechanical kebab-case form survives as an alias.
    shellyfleet()
        .args(["shelly", "reset-wi-fi-config", "--help"])
        .assert()
        .success();
}

#[test]
fn unknown_subcommand_fails() {
    shellyfleet()
        .args(["switch", "frobnicate"])
        .assert()
        .failure();
}

#[test]
fn mqtt_flags_require_mqtt_addr() {
    shellyfleet()
        .args([
            "switch",
            "get-status",
            "--interactive=false",
            "--mqtt-user",
            "alice",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mqtt-user is invalid without mqtt-addr"));
}

#[test]
fn invalid_prefer_ip_version_is_rejected() {
    shellyfleet()
        .args([
            "switch",
            "get-status",
            "--interactive=false",
            "--prefer-ip-version",
            "5",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("prefer-ip-version"));
}

#[test]
fn prometheus_exposes_server_flags() {
    shellyfleet()
        .args(["prometheus", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bind-port"))
        .stdout(predicate::str::contains("--prometheus-namespace"))
        .stdout(predicate::str::contains("--device-ttl"));
}
