//! Corruption recovery tests for the dosetrack binary.
//!
//! These tests verify the system can handle:
//! - Corrupted dose event lines
//! - Partial writes to the event log
//! - A corrupted medications file
//! - Invalid dose-time configuration

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write as IoWrite;
use tempfile::TempDir;

fn cli(dir: &TempDir, moment: &str) -> Command {
    let config = dir.path().join("config.toml");
    if !config.exists() {
        fs::write(&config, "").expect("Failed to write config");
    }
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dosetrack"));
    cmd.arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--config")
        .arg(config)
        .arg("--at")
        .arg(moment);
    cmd
}

fn setup_test_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::create_dir_all(dir.path().join("data")).unwrap();
    dir
}

fn add_auto_medication(dir: &TempDir) {
    cli(dir, "2024-04-10T08:00")
        .args(["add", "--name", "Metoprolol", "--dose", "1,0,0,0", "--supply", "10", "--auto"])
        .assert()
        .success();
}

#[test]
fn test_corrupted_event_lines_are_skipped() {
    let dir = setup_test_dir();
    add_auto_medication(&dir);

    let events_path = dir.path().join("data/dose_events.jsonl");
    fs::write(&events_path, "{ invalid json }\n{ more invalid }\n").unwrap();

    cli(&dir, "2024-04-10T10:30")
        .args(["end-dose-time", "--slot", "morning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Metoprolol: recorded 1"));

    cli(&dir, "2024-04-10T10:30")
        .args(["history", "--from", "2024-04-10", "--to", "2024-04-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 (1 doses)"));
}

#[test]
fn test_partial_event_line() {
    let dir = setup_test_dir();
    add_auto_medication(&dir);

    cli(&dir, "2024-04-10T10:30")
        .args(["end-dose-time", "--slot", "morning"])
        .assert()
        .success();

    // Simulate a crash in the middle of an append.
    let events_path = dir.path().join("data/dose_events.jsonl");
    let mut file = fs::OpenOptions::new().append(true).open(&events_path).unwrap();
    write!(file, r#"{{"id":"partial"#).unwrap();
    drop(file);

    // The recorded dose is still found, so nothing is taken twice.
    cli(&dir, "2024-04-10T10:30")
        .args(["end-dose-time", "--slot", "morning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already recorded"));

    cli(&dir, "2024-04-10T10:30")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("supply 9"));
}

#[test]
fn test_empty_files() {
    let dir = setup_test_dir();
    fs::write(dir.path().join("data/dose_events.jsonl"), "").unwrap();

    cli(&dir, "2024-04-10T10:30")
        .args(["history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No doses recorded"));
}

#[test]
fn test_corrupted_medications_file_fails_loudly() {
    let dir = setup_test_dir();
    fs::write(dir.path().join("data/medications.json"), "{ not a list").unwrap();

    cli(&dir, "2024-04-10T10:30")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is corrupt"));

    // The file is left for manual recovery.
    let contents = fs::read_to_string(dir.path().join("data/medications.json")).unwrap();
    assert_eq!(contents, "{ not a list");
}

#[test]
fn test_invalid_dose_time_config() {
    let dir = setup_test_dir();
    fs::write(
        dir.path().join("config.toml"),
        "[dose_times]\nmorning = \"06:00-12:00\"\nnoon = \"11:00-14:00\"\n",
    )
    .unwrap();

    cli(&dir, "2024-04-10T10:30")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config"));
}

#[test]
fn test_unparseable_config_file() {
    let dir = setup_test_dir();
    fs::write(dir.path().join("config.toml"), "[dose_times\nmorning = ").unwrap();

    cli(&dir, "2024-04-10T10:30")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Toml"));
}
