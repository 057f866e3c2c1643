//! End-to-end tests of the `wireport` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn wireport() -> Command {
    let mut cmd = Command::cargo_bin("wireport").expect("binary built");
    cmd.env_remove("WIREPORT_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn genkey_prints_key_pair() {
    wireport()
        .arg("genkey")
        .assert()
        .success()
        .stdout(predicate::str::contains("Private Key:"))
        .stdout(predicate::str::contains("Public Key:"));
}

#[test]
fn genkey_json_is_parseable() {
    let output = wireport().args(["--format", "json", "genkey"]).output().expect("run");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["private_key"].as_str().map(str::len), Some(44));
    assert_eq!(json["public_key"].as_str().map(str::len), Some(44));
}

#[test]
fn genpsk_prints_one_key() {
    wireport()
        .arg("genpsk")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[A-Za-z0-9+/]{43}=\n$").expect("regex"));
}

#[test]
fn missing_config_file_fails() {
    wireport()
        .args(["--config", "/nonexistent/wireport.toml", "interface", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/wireport.toml"));
}

#[test]
fn invalid_address_rejected_by_parser() {
    wireport()
        .args(["interface", "set", "wg0", "--address", "not-a-cidr"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--address"));
}

#[cfg(not(feature = "linux"))]
#[test]
fn kernel_commands_unsupported_without_linux_feature() {
    wireport()
        .args(["interface", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported"));
}
