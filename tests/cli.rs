use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn vidshare() -> Command {
    let mut cmd = Command::cargo_bin("vidshare").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn prints_version() {
    vidshare()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    vidshare()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Vidshare"))
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn rejects_unknown_arguments() {
    vidshare()
        .arg("--frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unexpected argument --frobnicate"));
}

#[test]
fn replay_prints_watch_calls() {
    let dir = tempdir().unwrap();
    let events = dir.path().join("events.json");
    fs::write(
        &events,
        r#"[
            {"event": "loadedmetadata", "duration": 10},
            {"event": "playing"},
            {"tick": 4},
            {"event": "ended"}
        ]"#,
    )
    .unwrap();
    let config = dir.path().join("config.yaml");
    fs::write(&config, "watch:\n  history_floor_secs: 2\n").unwrap();

    vidshare()
        .arg("--config")
        .arg(&config)
        .arg("replay")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"step":3,"call":"add_to_history","position":0}"#,
        ))
        .stdout(predicate::str::contains(r#"{"step":3,"call":"increment_view"}"#))
        .stdout(predicate::str::contains(
            "summary: watched=4s threshold=4s view_counted=true history_logged=true",
        ));
}

#[test]
fn replay_reports_missing_file() {
    let dir = tempdir().unwrap();
    vidshare()
        .arg("replay")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read replay file"));
}

#[test]
fn comments_surface_backend_failures() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    fs::write(
        &config,
        "api:\n  base_url: http://127.0.0.1:1/api/v1/\n  timeout: 2s\n",
    )
    .unwrap();

    vidshare()
        .arg("--config")
        .arg(&config)
        .arg("comments")
        .arg("abc123")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Loading comments failed"));
}
