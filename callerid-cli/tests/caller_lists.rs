use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn callerid_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("callerid"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

fn write_payload(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write payload");
    path
}

fn write_config(home: &Path, body: &str) {
    let root = home.join(".callerid");
    fs::create_dir_all(&root).expect("create config dir");
    fs::write(root.join("config.yaml"), body).expect("write config");
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run callerid");
    assert!(
        output.status.success(),
        "command failed: status={} stderr={}",
        output.status,
        String::from_utf8_lossy(&output.stderr),
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn set_then_lookup_reports_blocked_caller() {
    let home = TempDir::new().expect("home");
    let payload = write_payload(
        home.path(),
        "mixed.json",
        r#"{"type":"default","items":[
            {"label":"Spam","phonenumber":4930111,"isRemoved":false,"isBlocked":true},
            {"label":"Office","phonenumber":"4930222","isRemoved":false,"isBlocked":false}
        ]}"#,
    );

    callerid_cmd(home.path())
        .args(["list", "set"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(contains("caller list 'default' applied (2 items)"))
        .stdout(contains("1 allowed, 1 blocked"));

    callerid_cmd(home.path())
        .args(["lookup", "+49 30111"])
        .assert()
        .success()
        .stdout(contains("BLOCKED"))
        .stdout(contains("Spam"));

    let office = stdout_json(callerid_cmd(home.path()).args(["lookup", "4930222", "--json"]));
    assert_eq!(office["result"], "identified");
    assert_eq!(office["label"], "Office");

    // The extension consumed the shared document.
    assert!(!home.path().join(".callerid/shared/callerId.json").exists());

    let status = stdout_json(callerid_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["directory_blocking"], 1);
    assert_eq!(status["directory_identification"], 1);
    assert_eq!(status["daemon_running"], false);
}

#[test]
fn clear_empties_lists_and_directory() {
    let home = TempDir::new().expect("home");
    let payload = write_payload(
        home.path(),
        "identify.json",
        r#"{"type":"identify","items":[{"label":"Doe, Jane","phonenumber":4930123}]}"#,
    );
    callerid_cmd(home.path())
        .args(["list", "set"])
        .arg(&payload)
        .assert()
        .success();

    callerid_cmd(home.path())
        .args(["list", "clear"])
        .assert()
        .success()
        .stdout(contains("caller lists cleared"));

    let lists = stdout_json(callerid_cmd(home.path()).args(["list", "show", "--json"]));
    assert_eq!(lists["allowed"], Value::Array(Vec::new()));
    assert_eq!(lists["blocked"], Value::Array(Vec::new()));

    callerid_cmd(home.path())
        .args(["lookup", "4930123"])
        .assert()
        .success()
        .stdout(contains("UNKNOWN"));
}

#[test]
fn payload_from_stdin_is_accepted() {
    let home = TempDir::new().expect("home");
    assert_cmd::Command::from_std(callerid_cmd(home.path()))
        .args(["list", "set", "-"])
        .write_stdin(r#"{"type":"default","items":[{"label":"A","phonenumber":10,"isBlocked":true}]}"#)
        .assert()
        .success();

    let lists = stdout_json(callerid_cmd(home.path()).args(["list", "show", "--json"]));
    assert_eq!(lists["blocked"][0]["phoneNumber"], "10");
}

#[test]
fn invalid_number_is_rejected_before_any_write() {
    let home = TempDir::new().expect("home");
    let payload = write_payload(
        home.path(),
        "bad.json",
        r#"{"type":"block","items":[{"label":"X","phonenumber":"12ab","isBlocked":true}]}"#,
    );

    callerid_cmd(home.path())
        .args(["list", "set"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(contains("invalid phone number '12ab' at item 0"));

    assert!(!home.path().join(".callerid/callers").exists());
}

#[test]
fn caller_lists_are_unavailable_in_work_profile_mode() {
    let home = TempDir::new().expect("home");
    write_config(home.path(), "mode: workProfileMode\n");
    let payload = write_payload(
        home.path(),
        "block.json",
        r#"{"type":"block","items":[{"label":"Spam","phonenumber":1,"isBlocked":true}]}"#,
    );

    callerid_cmd(home.path())
        .args(["list", "set"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(contains("setCallerList is not available in workProfileMode"));
}

#[test]
fn mode_follows_device_dialer() {
    let home = TempDir::new().expect("home");
    write_config(
        home.path(),
        "device:\n  default_dialer: com.google.android.dialer\n",
    );
    let mode = stdout_json(callerid_cmd(home.path()).args(["mode", "--json"]));
    assert_eq!(mode["mode"], "defaultMode");
    assert_eq!(mode["contentProvider"], true);

    write_config(home.path(), "mode: compatibilityMode\ndevice:\n  profile_owner: true\n");
    callerid_cmd(home.path())
        .arg("mode")
        .assert()
        .success()
        .stdout(contains("compatibilityMode"));
}

#[test]
fn daemon_status_without_daemon_reports_not_running() {
    let home = TempDir::new().expect("home");
    let status = stdout_json(callerid_cmd(home.path()).args(["daemon", "status"]));
    assert_eq!(status["running"], false);
    assert!(status["socket"]
        .as_str()
        .expect("socket path")
        .ends_with(".callerid/daemon.sock"));
}
