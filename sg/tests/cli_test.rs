//! CLI smoke tests for the sg binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_send_console_prints_record() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let log = temp.path().join("messages.log");

    let mut cmd = Command::cargo_bin("sg").expect("binary builds");
    cmd.args([
        "--log-file",
        log.to_str().expect("utf-8 path"),
        "send",
        "--to",
        "+254700000000",
        "--body",
        "hello",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("to: +254700000000, body: hello"))
        .stdout(predicate::str::contains("delivered"));

    let content = std::fs::read_to_string(&log).expect("message log written");
    assert_eq!(content.lines().count(), 1);
}

#[test]
fn test_send_requires_recipient_and_body() {
    Command::cargo_bin("sg").expect("binary builds").arg("send").assert().failure();
}

#[test]
fn test_twilio_backend_needs_credentials() {
    let mut cmd = Command::cargo_bin("sg").expect("binary builds");
    cmd.env_remove("TWILIO_ACCOUNT_SID")
        .env_remove("TWILIO_AUTH_TOKEN")
        .env_remove("TWILIO_FROM_NUMBER")
        .args(["send", "--to", "+254700000000", "--body", "hello", "--backend", "twilio"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("TWILIO_ACCOUNT_SID"));
}
