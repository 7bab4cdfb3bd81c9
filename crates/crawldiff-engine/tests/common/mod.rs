#![allow(dead_code)]

use crawldiff_core::{PipelineConfig, Snapshot};
use crawldiff_engine::{ingest_snapshot, IngestReport};
use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn setup_db() -> (TempDir, Connection) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let conn = crawldiff_store::db::open_and_migrate(&db_path).unwrap();
    (temp_dir, conn)
}

/// Crawl ids double as their day: `2026-05-DD`
pub fn snapshot(day: u32, models: Vec<Value>, endpoints: Vec<Value>) -> Snapshot {
    serde_json::from_value(json!({
        "crawl_id": format!("2026-05-{:02}", day),
        "crawled_at": format!("2026-05-{:02}T06:00:00Z", day),
        "models": models,
        "endpoints": endpoints,
        "providers": [{"slug": "acme", "name": "Acme"}],
    }))
    .unwrap()
}

pub fn ingest(conn: &mut Connection, snap: &Snapshot) -> IngestReport {
    ingest_snapshot(conn, snap, &PipelineConfig::default()).unwrap()
}

pub fn endpoint(uuid: &str, model: &str, context_length: u64) -> Value {
    json!({
        "uuid": uuid,
        "model_slug": model,
        "provider_slug": "acme",
        "provider_tag_slug": "acme/fp8",
        "context_length": context_length,
    })
}
