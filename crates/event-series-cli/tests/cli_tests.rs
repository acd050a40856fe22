//! Integration tests for the `series` CLI binary.
//!
//! `expand` is exercised on its own; the series subcommands run against a snapshot
//! store in a temporary directory, one process per step.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn series() -> Command {
    Command::cargo_bin("series").unwrap()
}

fn with_store(store: &Path) -> Command {
    let mut cmd = series();
    cmd.arg("--store").arg(store);
    cmd
}

fn json_of(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout must be JSON")
}

fn instants(value: &Value) -> Vec<String> {
    value["instants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// expand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn expand_keeps_wall_clock_across_spring_forward() {
    let out = json_of(series().args([
        "expand",
        "--rule",
        "FREQ=DAILY;COUNT=5",
        "--tz",
        "America/New_York",
        "--start",
        "2023-03-10T10:00",
    ]));
    assert_eq!(
        instants(&out),
        vec![
            "2023-03-10T15:00:00Z",
            "2023-03-11T15:00:00Z",
            "2023-03-12T14:00:00Z",
            "2023-03-13T14:00:00Z",
            "2023-03-14T14:00:00Z",
        ]
    );
    assert_eq!(out["truncated"], false);
}

#[test]
fn expand_accepts_json_rule() {
    let out = json_of(series().args([
        "expand",
        "--rule",
        r#"{"frequency":"WEEKLY","interval":1,"count":4,"byweekday":["TU","TH"]}"#,
        "--tz",
        "UTC",
        "--start",
        "2025-06-03T09:00",
    ]));
    assert_eq!(
        instants(&out),
        vec![
            "2025-06-03T09:00:00Z",
            "2025-06-05T09:00:00Z",
            "2025-06-10T09:00:00Z",
            "2025-06-12T09:00:00Z",
        ]
    );
}

#[test]
fn expand_honors_count_after_and_exclude() {
    let out = json_of(series().args([
        "expand",
        "--rule",
        "FREQ=DAILY",
        "--tz",
        "UTC",
        "--start",
        "2025-01-01T08:00",
        "--after",
        "2025-01-03T00:00:00Z",
        "--exclude",
        "2025-01-04T08:00:00Z",
        "--count",
        "2",
    ]));
    assert_eq!(
        instants(&out),
        vec!["2025-01-03T08:00:00Z", "2025-01-05T08:00:00Z"]
    );
}

#[test]
fn expand_reports_truncation_from_config_limits() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("series.toml");
    std::fs::write(&config, "[limits]\nmax_occurrences = 3\n").unwrap();

    let out = json_of(series().arg("--config").arg(&config).args([
        "expand",
        "--rule",
        "FREQ=WEEKLY",
        "--tz",
        "UTC",
        "--start",
        "2025-01-06T08:00",
    ]));
    assert_eq!(instants(&out).len(), 3);
    assert_eq!(out["truncated"], true);
}

#[test]
fn expand_rejects_unsupported_rule() {
    series()
        .args([
            "expand",
            "--rule",
            "FREQ=HOURLY",
            "--tz",
            "UTC",
            "--start",
            "2025-01-01T00:00",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rule"));
}

#[test]
fn expand_rejects_rule_parts_it_cannot_honor() {
    series()
        .args([
            "expand",
            "--rule",
            "FREQ=DAILY;BYHOUR=9,17",
            "--tz",
            "UTC",
            "--start",
            "2025-01-01T09:00",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BYHOUR"));
}

#[test]
fn truncation_is_logged_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("series.toml");
    std::fs::write(&config, "[limits]\nmax_occurrences = 2\n").unwrap();

    series()
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(&config)
        .args([
            "expand",
            "--rule",
            "FREQ=DAILY",
            "--tz",
            "UTC",
            "--start",
            "2025-01-06T08:00",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("safety horizon"));
}

#[test]
fn mutations_log_the_store_save() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.json");

    with_store(&store)
        .env("RUST_LOG", "info")
        .args([
            "event-create",
            "--name",
            "Standup",
            "--tz",
            "UTC",
            "--start",
            "2025-06-02T09:00",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("saved store"));
    assert!(store.exists());
}

#[test]
fn expand_rejects_unknown_timezone() {
    series()
        .args([
            "expand",
            "--rule",
            "FREQ=DAILY",
            "--tz",
            "Mars/Olympus_Mons",
            "--start",
            "2025-01-01T00:00",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Mars/Olympus_Mons"));
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "default_occurrence_count = \"many\"\n").unwrap();

    series()
        .arg("--config")
        .arg(&config)
        .args(["expand", "--rule", "FREQ=DAILY", "--tz", "UTC", "--start", "2025-01-01T00:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Series lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn promote_materialize_edit_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.json");

    let event = json_of(with_store(&store).args([
        "event-create",
        "--name",
        "Team Sync",
        "--tz",
        "America/New_York",
        "--start",
        "2025-06-02T10:00",
        "--duration",
        "30",
    ]));
    assert_eq!(event["startDate"], "2025-06-02T14:00:00Z");
    let event_slug = event["slug"].as_str().unwrap().to_string();

    let created = json_of(with_store(&store).args([
        "create",
        "--rule",
        "FREQ=WEEKLY;COUNT=3",
        "--event",
        &event_slug,
    ]));
    let slug = created["slug"].as_str().unwrap().to_string();
    assert_eq!(created["templateEventSlug"], event_slug.as_str());
    assert_eq!(created["timeZone"], "America/New_York");

    let listing = json_of(with_store(&store).args(["occurrences", &slug, "--include-past"]));
    let listing = listing.as_array().unwrap();
    assert_eq!(listing.len(), 3);
    assert_eq!(listing[0]["materialized"], true);
    assert_eq!(listing[1]["materialized"], false);

    let first = json_of(with_store(&store).args(["materialize", &slug, "2025-06-09"]));
    let again = json_of(with_store(&store).args(["materialize", &slug, "2025-06-09T14:00:00Z"]));
    assert_eq!(first["startDate"], "2025-06-09T14:00:00Z");
    assert_eq!(first["id"], again["id"]);

    let summary = json_of(with_store(&store).args([
        "--actor",
        "ops",
        "update-future",
        &slug,
        "--from",
        "2025-06-09T00:00:00Z",
        "--patch",
        r#"{"location":"Room 7"}"#,
    ]));
    assert_eq!(summary["count"], 1);

    let third = json_of(with_store(&store).args(["materialize", &slug, "2025-06-16"]));
    assert_eq!(third["location"], "Room 7");

    let deleted = json_of(with_store(&store).args(["delete", &slug, "--delete-events"]));
    assert_eq!(deleted["eventsDeleted"], 3);

    with_store(&store)
        .args(["show", &slug])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Series not found"));
}

#[test]
fn inline_create_requires_timezone() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.json");

    with_store(&store)
        .args(["create", "--rule", "FREQ=DAILY", "--start", "2025-06-02T07:30"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeZone"));

    let created = json_of(with_store(&store).args([
        "create",
        "--rule",
        "FREQ=WEEKLY;BYDAY=MO,WE",
        "--tz",
        "Europe/London",
        "--start",
        "2025-06-02T07:30",
        "--duration",
        "45",
        "--name",
        "Morning Run",
    ]));
    assert_eq!(created["name"], "Morning Run");
    assert_eq!(created["recurrenceRule"]["byweekday"], serde_json::json!(["MO", "WE"]));

    let slug = created["slug"].as_str().unwrap();
    let shown = json_of(with_store(&store).args(["show", slug]));
    assert_eq!(shown["anchor"], "2025-06-02T07:30:00");
}

#[test]
fn add_event_attaches_standalone_event() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.json");

    let created = json_of(with_store(&store).args([
        "create",
        "--rule",
        "FREQ=WEEKLY",
        "--tz",
        "UTC",
        "--start",
        "2025-06-02T09:00",
        "--name",
        "Review",
    ]));
    let slug = created["slug"].as_str().unwrap().to_string();

    let guest = json_of(with_store(&store).args([
        "event-create",
        "--name",
        "Guest Review",
        "--tz",
        "UTC",
        "--start",
        "2025-06-09T11:00",
    ]));
    let guest_slug = guest["slug"].as_str().unwrap().to_string();

    let attached = json_of(with_store(&store).args([
        "add-event",
        &slug,
        "--event",
        &guest_slug,
        "--date",
        "2025-06-09T09:00:00Z",
    ]));
    assert_eq!(attached["seriesSlug"], slug.as_str());
    assert_eq!(attached["startDate"], "2025-06-09T09:00:00Z");

    let detached = json_of(with_store(&store).args(["delete", &slug]));
    assert_eq!(detached["eventsDetached"], 2);
}

#[test]
fn tenants_do_not_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.json");

    let created = json_of(with_store(&store).args([
        "--tenant",
        "acme",
        "create",
        "--rule",
        "FREQ=DAILY",
        "--tz",
        "UTC",
        "--start",
        "2025-06-02T09:00",
        "--name",
        "Standup",
    ]));
    let slug = created["slug"].as_str().unwrap();

    with_store(&store)
        .args(["--tenant", "globex", "show", slug])
        .assert()
        .failure();
    with_store(&store)
        .args(["--tenant", "acme", "show", slug])
        .assert()
        .success();
}
