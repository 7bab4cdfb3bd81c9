//! CLI integration tests
//!
//! These drive the `crawldiff` binary end to end against a scratch database
//! and assert on the JSON it prints.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(temp_dir: &TempDir, args: &[&str]) -> Output {
    let db_path = temp_dir.path().join("crawldiff.db");
    Command::new(env!("CARGO_BIN_EXE_crawldiff"))
        .current_dir(temp_dir.path())
        .args(args)
        .args(["--db", db_path.to_str().unwrap(), "--log", "test"])
        .output()
        .expect("Failed to execute CLI")
}

fn run_json(temp_dir: &TempDir, args: &[&str]) -> Value {
    let output = run(temp_dir, args);
    assert!(
        output.status.success(),
        "CLI command {:?} should succeed. Stderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON document")
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

fn write_snapshot(temp_dir: &TempDir, day: u32, context_length: u64) -> PathBuf {
    write_json(
        temp_dir.path(),
        &format!("snapshot-{}.json", day),
        &json!({
            "crawl_id": format!("2026-05-{:02}", day),
            "crawled_at": format!("2026-05-{:02}T06:00:00Z", day),
            "models": [{"slug": "acme/large", "name": "Large"}],
            "endpoints": [{
                "uuid": "ep-1",
                "model_slug": "acme/large",
                "provider_slug": "acme",
                "provider_tag_slug": "acme/fp8",
                "context_length": context_length,
            }],
            "providers": [{"slug": "acme", "name": "Acme"}],
        }),
    )
}

#[test]
fn test_cli_ingest_then_feed() {
    let temp_dir = TempDir::new().unwrap();
    let first = write_snapshot(&temp_dir, 1, 4096);
    let second = write_snapshot(&temp_dir, 2, 8192);

    let report = run_json(&temp_dir, &["ingest", "--snapshot", first.to_str().unwrap()]);
    assert_eq!(report["crawl_id"], "2026-05-01");
    assert_eq!(report["previous_crawl_id"], Value::Null);

    let report = run_json(&temp_dir, &["ingest", "--snapshot", second.to_str().unwrap()]);
    assert_eq!(report["previous_crawl_id"], "2026-05-01");
    assert_eq!(report["reconciled"]["endpoint"]["insert"], 1);

    let page = run_json(&temp_dir, &["feed"]);
    assert_eq!(page["done"], true);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["crawl_id"], "2026-05-02");
    assert_eq!(items[0]["changes"][0]["path"], "context_length");
}

#[test]
fn test_cli_days_and_crawls() {
    let temp_dir = TempDir::new().unwrap();
    for (day, ctx) in [(1, 4096), (2, 8192)] {
        let path = write_snapshot(&temp_dir, day, ctx);
        run_json(&temp_dir, &["ingest", "--snapshot", path.to_str().unwrap()]);
    }

    let days = run_json(&temp_dir, &["days"]);
    assert_eq!(days, json!([{"day": "2026-05-02", "change_count": 1}]));

    let crawls = run_json(&temp_dir, &["crawls"]);
    let ids: Vec<_> = crawls
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["crawl_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["2026-05-02", "2026-05-01"]);
}

#[test]
fn test_cli_recompute_is_stable() {
    let temp_dir = TempDir::new().unwrap();
    for (day, ctx) in [(1, 4096), (2, 8192)] {
        let path = write_snapshot(&temp_dir, day, ctx);
        run_json(&temp_dir, &["ingest", "--snapshot", path.to_str().unwrap()]);
    }

    let report = run_json(&temp_dir, &["recompute", "--crawl", "2026-05-02"]);
    assert_eq!(report["reconciled"]["endpoint"]["insert"], 0);
    assert_eq!(report["reconciled"]["endpoint"]["stable"], 1);
}

#[test]
fn test_cli_classify_payload_file() {
    let temp_dir = TempDir::new().unwrap();
    let payload = write_json(
        temp_dir.path(),
        "payload.json",
        &json!({"type": "UPDATE", "key": "context_length", "oldValue": 4096, "value": 8192}),
    );

    let shape = run_json(&temp_dir, &["classify", "--payload", payload.to_str().unwrap()]);
    assert_eq!(shape["shape"], "value_change");
    assert_eq!(shape["old_value"], 4096);
    assert_eq!(shape["new_value"], 8192);

    let garbage = write_json(temp_dir.path(), "garbage.json", &json!([1, 2, 3]));
    let shape = run_json(&temp_dir, &["classify", "--payload", garbage.to_str().unwrap()]);
    assert_eq!(shape["shape"], "unknown_shape");
}

#[test]
fn test_cli_entity_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_snapshot(&temp_dir, 1, 4096);
    run_json(&temp_dir, &["ingest", "--snapshot", path.to_str().unwrap()]);

    let entity = run_json(&temp_dir, &["entity", "--type", "endpoint", "--key", "ep-1"]);
    assert_eq!(entity["entity_key"], "ep-1");

    let missing = run(&temp_dir, &["entity", "--type", "model", "--key", "nope"]);
    assert!(!missing.status.success());
}

#[test]
fn test_cli_rejects_bad_cursor_and_snapshot() {
    let temp_dir = TempDir::new().unwrap();

    let output = run(&temp_dir, &["feed", "--cursor", "not base64!"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));

    let broken = temp_dir.path().join("broken.json");
    fs::write(&broken, "{not json").unwrap();
    let output = run(&temp_dir, &["ingest", "--snapshot", broken.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_empty_feed_is_done() {
    let temp_dir = TempDir::new().unwrap();
    let page = run_json(&temp_dir, &["feed", "--goal", "10"]);
    assert_eq!(page, json!({"items": [], "next_cursor": null, "done": true}));
}
