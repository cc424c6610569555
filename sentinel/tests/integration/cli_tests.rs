//! End-to-end checks of the `sentinel` command line.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use sentinel::keychain::is_valid_signature;

fn sentinel(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sentinel"));
    cmd.env("SENTINEL_DATA_DIR", data_dir).env("RUST_LOG", "off");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).unwrap().trim().to_string()
}

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    sentinel(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("keychain"));
}

#[test]
fn public_key_is_generated_once_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let first = stdout_of(sentinel(dir.path()).args(["keychain", "public-key"]));
    let second = stdout_of(sentinel(dir.path()).args(["keychain", "public-key"]));

    assert_eq!(first.len(), 66);
    assert!(first.starts_with("02") || first.starts_with("03"));
    assert_eq!(first, second);
    assert!(dir.path().join("agent-keypair.json").exists());
}

#[test]
fn sign_output_verifies_against_public_key() {
    let dir = tempfile::tempdir().unwrap();
    let public_key = stdout_of(sentinel(dir.path()).args(["keychain", "public-key"]));
    let signature = stdout_of(sentinel(dir.path()).args(["keychain", "sign", "hello"]));
    assert!(is_valid_signature("hello", &public_key, &signature));
}

#[test]
fn encrypt_then_decrypt_through_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    let payload = stdout_of(sentinel(dir.path()).args(["keychain", "encrypt", "secret value"]));
    let payload: serde_json::Value = serde_json::from_str(&payload).unwrap();

    sentinel(dir.path())
        .args([
            "keychain",
            "decrypt",
            "--encrypted",
            payload["encrypted"].as_str().unwrap(),
            "--ephemeral-public-key",
            payload["ephemPublicKey"].as_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("secret value\n"));
}

#[test]
fn bad_config_value_fails_with_message() {
    let dir = tempfile::tempdir().unwrap();
    sentinel(dir.path())
        .env("SENTINEL_POLL_INTERVAL_SECS", "soon")
        .args(["keychain", "public-key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SENTINEL_"));
}
