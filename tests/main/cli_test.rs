//! End-to-end runs of the `courier` binary.

use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;

fn courier(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("courier").expect("courier binary should be built");
    cmd.current_dir(workdir)
        .env("COURIER_CONFIG_PATH", workdir.join("absent.toml"))
        .env("COURIER_DB_PATH", workdir.join("data").join("courier.db"))
        .env("COURIER_LOG_LEVEL", "error")
        .env_remove("COURIER_EMAIL_PROVIDER")
        .env_remove("SENDGRID_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    match serde_json::from_slice(&output) {
        Ok(value) => value,
        Err(err) => panic!(
            "stdout should be JSON: {err}\n{}",
            String::from_utf8_lossy(&output)
        ),
    }
}

fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("should create temp dir")
}

#[test]
fn ephemeral_send_sms_prints_pending_message() {
    let dir = tempdir();
    let message = json_stdout(courier(dir.path()).args([
        "--ephemeral",
        "send-sms",
        "--from",
        "+12016661234",
        "--to",
        "+18045551234",
        "--body",
        "hello",
    ]));

    assert_eq!(message["status"], "pending");
    assert_eq!(message["type"], "sms");
    assert_eq!(message["body"], "hello");
    assert!(message["conversation_id"].as_i64().is_some_and(|id| id > 0));
    assert!(!dir.path().join("data").exists(), "ephemeral runs must not touch disk");
}

#[test]
fn sqlite_run_persists_across_invocations() {
    let dir = tempdir();

    let init = json_stdout(courier(dir.path()).arg("init"));
    assert_eq!(init["status"], "ready");
    assert!(dir.path().join("data").join("courier.db").exists());

    let sent = json_stdout(courier(dir.path()).args([
        "send-email",
        "--from",
        "user@usehatchapp.com",
        "--to",
        "contact@gmail.com",
        "--body",
        "<p>hi</p>",
    ]));
    assert_eq!(sent["type"], "email");

    let inbound = json_stdout(courier(dir.path()).args([
        "inbound-email",
        "--from",
        "contact@gmail.com",
        "--to",
        "user@usehatchapp.com",
        "--body",
        "reply",
        "--provider-id",
        "message-2",
    ]));
    assert_eq!(inbound["duplicate"], false);
    assert_eq!(inbound["message"]["status"], "delivered");
    assert_eq!(inbound["message"]["conversation_id"], sent["conversation_id"]);

    let replay = json_stdout(courier(dir.path()).args([
        "inbound-email",
        "--from",
        "contact@gmail.com",
        "--to",
        "user@usehatchapp.com",
        "--body",
        "reply",
        "--provider-id",
        "message-2",
    ]));
    assert_eq!(replay["duplicate"], true);
    assert_eq!(replay["message"]["id"], inbound["message"]["id"]);

    let page = json_stdout(courier(dir.path()).args(["conversations", "--limit", "500"]));
    assert_eq!(page["total"], 1);
    assert_eq!(page["per_page"], 100);
    assert_eq!(page["has_more"], false);

    let conversation_id = sent["conversation_id"]
        .as_i64()
        .expect("conversation id should be numeric")
        .to_string();
    let history = json_stdout(courier(dir.path()).args(["messages", conversation_id.as_str()]));
    let bodies: Vec<&str> = history
        .as_array()
        .expect("history should be an array")
        .iter()
        .filter_map(|m| m["body"].as_str())
        .collect();
    assert_eq!(bodies, vec!["<p>hi</p>", "reply"]);
}

#[test]
fn invalid_request_exits_nonzero() {
    let dir = tempdir();
    courier(dir.path())
        .args([
            "--ephemeral",
            "send-sms",
            "--from",
            "+12016661234",
            "--to",
            "+18045551234",
            "--body",
            "hello",
            "--type",
            "fax",
        ])
        .assert()
        .failure();
}

#[test]
fn unknown_conversation_exits_nonzero() {
    let dir = tempdir();
    courier(dir.path())
        .args(["--ephemeral", "messages", "42"])
        .assert()
        .failure();
}

#[test]
fn invalid_config_file_is_reported() {
    let dir = tempdir();
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "[database]\nmax_connections = 0\n").expect("should write config");
    courier(dir.path())
        .env("COURIER_CONFIG_PATH", &config)
        .args(["--ephemeral", "init"])
        .assert()
        .failure();
}
