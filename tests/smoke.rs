//! Smoke tests -- verify the binary runs and its subcommands respond.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli(workdir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dj-scheduler").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("DJ_SCHEDULER_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = tempfile::TempDir::new().unwrap();
    cli(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fair round-robin request queue"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::TempDir::new().unwrap();
    cli(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dj-scheduler"));
}

#[test]
fn test_serve_subcommand_exists() {
    let dir = tempfile::TempDir::new().unwrap();
    cli(&dir).args(["serve", "--help"]).assert().success();
}

#[test]
fn test_check_config_prints_defaults_with_env_override() {
    let dir = tempfile::TempDir::new().unwrap();
    cli(&dir)
        .arg("check-config")
        .env("DJ_RATING_MIN_HATERS", "5")
        .assert()
        .success()
        .stdout(predicate::str::contains("[rating]"))
        .stdout(predicate::str::contains("min_haters = 5"))
        .stdout(predicate::str::contains("bind = \"127.0.0.1:8910\""));
}

#[test]
fn test_check_config_reads_local_file() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("dj-scheduler.toml"),
        "[requests]\nlimit = 3\n",
    )
    .unwrap();
    cli(&dir)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("limit = 3"));
}

#[test]
fn test_check_config_rejects_missing_explicit_file() {
    let dir = tempfile::TempDir::new().unwrap();
    cli(&dir)
        .args(["check-config", "--config", "nope.toml"])
        .assert()
        .failure();
}

#[test]
fn test_inspect_lists_play_order() {
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = r#"{
        "lastId": 3,
        "submitterOrder": [1, 2],
        "playlists": [
            {"submitterId": 1, "tracks": [
                {"id": 1, "media": "/m/a.mp3", "title": "First", "artist": "Ann", "duration": 100, "submitterId": 1, "haters": []},
                {"id": 3, "media": "/m/c.mp3", "title": "Third", "artist": null, "duration": 100, "submitterId": 1, "haters": []}
            ]},
            {"submitterId": 2, "tracks": [
                {"id": 2, "media": "/m/b.mp3", "title": "Second", "artist": null, "duration": 100, "submitterId": 2, "haters": [5]}
            ]}
        ],
        "backlogAlreadyPlayedMediaRefs": []
    }"#;
    std::fs::write(dir.path().join("saved.json"), snapshot).unwrap();

    cli(&dir)
        .args(["inspect", "--snapshot", "saved.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ann — First"))
        .stdout(predicate::str::is_match(r"(?s)First.*Second.*Third").unwrap());
}

#[test]
fn test_inspect_missing_snapshot_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    cli(&dir)
        .args(["inspect", "--snapshot", "absent.json"])
        .assert()
        .failure();
}
