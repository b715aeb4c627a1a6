use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

const PAYLOAD: &str = r#"{"items":[
    {"ihash":"h1","surname":"Doe","givenname":"Jane","isFavorite":true,
     "phonenumbers":[{"value":"+4930123","label":"work"}]},
    {"ihash":"h2","surname":"Roe","company":"ACME"}
]}"#;

fn callerid_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("callerid"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

fn work_profile_home(config: &str) -> (TempDir, PathBuf) {
    let home = TempDir::new().expect("home");
    let root = home.path().join(".callerid");
    fs::create_dir_all(&root).expect("create config dir");
    fs::write(root.join("config.yaml"), config).expect("write config");
    let payload = home.path().join("contacts.json");
    fs::write(&payload, PAYLOAD).expect("write payload");
    (home, payload)
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
fn plan_sync_and_replan_converge() {
    let (home, payload) = work_profile_home("mode: workProfileMode\n");

    callerid_cmd(home.path())
        .args(["contacts", "plan"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(contains("[plan] 2 to insert, 0 to keep"))
        .stdout(contains("+ h1"));
    assert!(
        !home.path().join(".callerid/contacts.json").exists(),
        "plan must not touch the store"
    );

    let outcome = stdout_json(
        callerid_cmd(home.path())
            .args(["contacts", "sync", "--json"])
            .arg(&payload),
    );
    assert_eq!(outcome["report"]["inserted"]["applied"], 2);
    assert_eq!(outcome["report"]["deleted"]["applied"], 0);

    callerid_cmd(home.path())
        .args(["contacts", "plan"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(contains("[plan] 0 to insert, 2 to keep (0 flag changes, 0 unblocks), 0 to delete"));

    let status = stdout_json(callerid_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["mode"], "workProfileMode");
    assert_eq!(status["synced_contacts"], 2);
    assert_eq!(status["last_run"]["inserted"], 2);
    assert!(status["synced_at"].is_string());
}

#[test]
fn block_unblock_and_clear() {
    let (home, payload) = work_profile_home("mode: workProfileMode\n");
    callerid_cmd(home.path())
        .args(["contacts", "sync"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(contains("inserted"));

    callerid_cmd(home.path())
        .args(["contacts", "block", "h1"])
        .assert()
        .success()
        .stdout(contains("'h1' now goes to voicemail"));
    callerid_cmd(home.path())
        .args(["contacts", "unblock", "h1"])
        .assert()
        .success()
        .stdout(contains("'h1' rings again"));
    callerid_cmd(home.path())
        .args(["contacts", "block", "nope"])
        .assert()
        .failure()
        .stderr(contains("no synced contact with source id 'nope'"));

    callerid_cmd(home.path())
        .args(["contacts", "clear"])
        .assert()
        .success()
        .stdout(contains("deleted 2 contacts"));

    let status = stdout_json(callerid_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["synced_contacts"], 0);
}

#[test]
fn vacation_sync_silences_non_favourites() {
    let (home, payload) = work_profile_home("mode: workProfileMode\n");
    callerid_cmd(home.path())
        .args(["contacts", "sync"])
        .arg(&payload)
        .assert()
        .success();

    callerid_cmd(home.path())
        .args(["contacts", "plan", "--vacation"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(contains("(1 flag changes, 1 unblocks)"));
}

#[test]
fn contact_sync_is_unavailable_outside_work_profile() {
    let (home, payload) = work_profile_home("mode: defaultMode\n");
    callerid_cmd(home.path())
        .args(["contacts", "sync"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(contains("syncContacts is not available in defaultMode"));
}

#[test]
fn contact_sync_requires_contacts_permission() {
    let (home, payload) =
        work_profile_home("mode: workProfileMode\npermissions:\n  contacts: false\n");
    callerid_cmd(home.path())
        .args(["contacts", "sync"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(contains("contacts permission not granted"));
}

#[test]
fn contact_without_identity_is_rejected() {
    let (home, _) = work_profile_home("mode: workProfileMode\n");
    let payload = home.path().join("anonymous.json");
    fs::write(&payload, r#"{"items":[{"surname":"Nobody"}]}"#).expect("write payload");

    callerid_cmd(home.path())
        .args(["contacts", "sync"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(contains("contact at item 0 has no ihash, guid, or datasource id"));
}
