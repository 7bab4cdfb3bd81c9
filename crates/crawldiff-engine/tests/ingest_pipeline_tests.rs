//! Ingest and recompute pipeline tests against an on-disk database

mod common;

use common::{endpoint, ingest, setup_db, snapshot};
use crawldiff_core::errors::ExErrorKind;
use crawldiff_core::logging_facility::test_capture::init_test_capture;
use crawldiff_core::materialize::MaterializeCounts;
use crawldiff_core::types::schema::{EVENT_END, EVENT_START, FIELD_RUN_ID};
use crawldiff_core::{ChangeExtractor, ChangeKind, ChangeSet, Entity, EntityType, PipelineConfig};
use crawldiff_engine::{ingest_snapshot, recompute_changes, reconcile_change_sets};
use crawldiff_store::repo::{changes, crawls, days, entities};
use serde_json::json;

#[test]
fn test_first_ingest_materializes_without_changes() {
    let (_dir, mut conn) = setup_db();
    let snap = snapshot(1, vec![json!({"slug": "m1"}), json!({"slug": "m2"})], vec![]);

    let report = ingest(&mut conn, &snap);

    assert!(report.newly_recorded);
    assert_eq!(report.previous_crawl_id, None);
    assert_eq!(report.materialized[&EntityType::Model].insert, 2);
    assert_eq!(report.materialized[&EntityType::Provider].insert, 1);
    assert!(report.reconciled.is_empty());
}

#[test]
fn test_reingest_same_snapshot_is_stable() {
    let (_dir, mut conn) = setup_db();
    let snap = snapshot(1, vec![json!({"slug": "m1"}), json!({"slug": "m2"})], vec![]);

    ingest(&mut conn, &snap);
    let again = ingest(&mut conn, &snap);

    assert!(!again.newly_recorded);
    assert_eq!(
        again.materialized[&EntityType::Model],
        MaterializeCounts {
            stable: 2,
            ..Default::default()
        }
    );
    assert_eq!(crawls::list_crawls(&conn).unwrap().len(), 1);
}

#[test]
fn test_second_crawl_records_update_and_converges() {
    let (_dir, mut conn) = setup_db();
    ingest(
        &mut conn,
        &snapshot(1, vec![json!({"slug": "m1", "context_length": 4096})], vec![]),
    );
    let second = snapshot(2, vec![json!({"slug": "m1", "context_length": 8192})], vec![]);

    let report = ingest(&mut conn, &second);
    assert_eq!(report.previous_crawl_id.as_deref(), Some("2026-05-01"));
    assert_eq!(report.reconciled[&EntityType::Model].insert, 1);

    let stored = changes::load_changes(&conn, "2026-05-01", "2026-05-02", EntityType::Model).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.change_kind, ChangeKind::Update);
    assert_eq!(stored[0].record.path, "context_length");
    assert_eq!(stored[0].record.before, json!(4096));
    assert_eq!(stored[0].record.after, json!(8192));

    let rerun = ingest(&mut conn, &second);
    let counts = rerun.reconciled[&EntityType::Model];
    assert_eq!((counts.insert, counts.delete, counts.update, counts.stable), (0, 0, 0, 1));
    assert_eq!(changes::count_changes(&conn, "2026-05-02").unwrap(), 1);
}

#[test]
fn test_absent_entity_marked_unavailable_once() {
    let (_dir, mut conn) = setup_db();
    ingest(&mut conn, &snapshot(1, vec![json!({"slug": "x"}), json!({"slug": "y"})], vec![]));
    let second = ingest(&mut conn, &snapshot(2, vec![json!({"slug": "x"})], vec![]));
    assert_eq!(second.materialized[&EntityType::Model].unavailable, 1);
    assert_eq!(second.reconciled[&EntityType::Model].insert, 1);

    let marked_at = entities::get_entity(&conn, EntityType::Model, "y")
        .unwrap()
        .unwrap()
        .unavailable_at;
    assert_eq!(
        marked_at.map(|t| t.to_rfc3339()),
        Some("2026-05-02T06:00:00+00:00".to_string())
    );

    let third = ingest(&mut conn, &snapshot(3, vec![json!({"slug": "x"})], vec![]));
    assert_eq!(third.materialized[&EntityType::Model].unavailable, 0);
    let still = entities::get_entity(&conn, EntityType::Model, "y")
        .unwrap()
        .unwrap()
        .unavailable_at;
    assert_eq!(still, marked_at);
}

#[test]
fn test_recompute_with_wider_volatile_set_deletes_record() {
    let (_dir, mut conn) = setup_db();
    ingest(&mut conn, &snapshot(1, vec![json!({"slug": "m1", "rank": 1})], vec![]));
    ingest(&mut conn, &snapshot(2, vec![json!({"slug": "m1", "rank": 2})], vec![]));
    assert_eq!(changes::count_changes(&conn, "2026-05-02").unwrap(), 1);

    let mut config = PipelineConfig::default();
    config.volatile_fields.push("rank".to_string());
    let report = recompute_changes(&mut conn, "2026-05-02", &config).unwrap();

    assert_eq!(report.reconciled[&EntityType::Model].delete, 1);
    assert_eq!(changes::count_changes(&conn, "2026-05-02").unwrap(), 0);
    assert!(days::list_change_days(&conn).unwrap().is_empty());
}

#[test]
fn test_recompute_unknown_crawl_is_not_found() {
    let (_dir, mut conn) = setup_db();
    let err = recompute_changes(&mut conn, "2099-01-01", &PipelineConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
    assert!(err.run_id().is_some());
}

#[test]
fn test_invalid_snapshot_writes_nothing() {
    let (_dir, mut conn) = setup_db();
    let snap = snapshot(1, vec![json!({"slug": "m1"}), json!({"slug": "m1"})], vec![]);

    let err = ingest_snapshot(&mut conn, &snap, &PipelineConfig::default()).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::DuplicateEntityKey);
    assert_eq!(err.crawl_id(), Some("2026-05-01"));
    assert!(crawls::list_crawls(&conn).unwrap().is_empty());
}

#[test]
fn test_endpoint_changes_carry_identity() {
    let (_dir, mut conn) = setup_db();
    ingest(&mut conn, &snapshot(1, vec![json!({"slug": "m1"})], vec![endpoint("e1", "m1", 8)]));
    ingest(&mut conn, &snapshot(2, vec![json!({"slug": "m1"})], vec![endpoint("e1", "m1", 16)]));

    let stored =
        changes::load_changes(&conn, "2026-05-01", "2026-05-02", EntityType::Endpoint).unwrap();
    assert_eq!(stored.len(), 1);
    let record = &stored[0].record;
    assert_eq!(record.endpoint_uuid.as_deref(), Some("e1"));
    assert_eq!(record.model_slug.as_deref(), Some("m1"));
    assert_eq!(record.provider_tag_slug.as_deref(), Some("acme/fp8"));
}

#[test]
fn test_ingest_logs_lifecycle_events() {
    let capture = init_test_capture();
    let (_dir, mut conn) = setup_db();
    let mut snap = snapshot(1, vec![json!({"slug": "m1"})], vec![]);
    snap.crawl_id = "2026-05-01-logging-unique".to_string();

    ingest(&mut conn, &snap);

    let starts: Vec<_> = capture
        .find("ingest_snapshot", EVENT_START)
        .into_iter()
        .filter(|e| e.field("crawl_id") == Some("2026-05-01-logging-unique"))
        .collect();
    assert_eq!(starts.len(), 1);
    assert!(starts[0].field(FIELD_RUN_ID).is_some());
    let ends: Vec<_> = capture
        .find("ingest_snapshot", EVENT_END)
        .into_iter()
        .filter(|e| e.field("crawl_id") == Some("2026-05-01-logging-unique"))
        .collect();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].field("insert"), Some("2"));
}

#[test]
fn test_rerun_of_older_crawl_leaves_current_state_alone() {
    let (_dir, mut conn) = setup_db();
    let first = snapshot(1, vec![json!({"slug": "a", "context_length": 1})], vec![]);
    ingest(&mut conn, &first);
    ingest(
        &mut conn,
        &snapshot(
            2,
            vec![json!({"slug": "a", "context_length": 2}), json!({"slug": "b"})],
            vec![],
        ),
    );

    let rerun = ingest(&mut conn, &first);
    assert!(!rerun.newly_recorded);
    assert_eq!(rerun.next_crawl_id.as_deref(), Some("2026-05-02"));
    let model_counts = rerun.materialized.get(&EntityType::Model).copied().unwrap_or_default();
    assert_eq!(model_counts.update, 0);
    assert_eq!(model_counts.unavailable, 0);
    let next = rerun.reconciled_next[&EntityType::Model];
    assert_eq!((next.insert, next.delete, next.stable), (0, 0, 2));

    let a = entities::get_entity(&conn, EntityType::Model, "a").unwrap().unwrap();
    assert_eq!(a.attributes["context_length"], json!(2));
    let b = entities::get_entity(&conn, EntityType::Model, "b").unwrap().unwrap();
    assert_eq!(b.unavailable_at, None);
    assert_eq!(changes::count_changes(&conn, "2026-05-02").unwrap(), 2);
}

#[test]
fn test_out_of_order_crawl_rejected_without_writes() {
    let (_dir, mut conn) = setup_db();
    ingest(&mut conn, &snapshot(1, vec![json!({"slug": "m1", "context_length": 1})], vec![]));
    ingest(&mut conn, &snapshot(3, vec![json!({"slug": "m1", "context_length": 3})], vec![]));

    let late = snapshot(2, vec![json!({"slug": "m1", "context_length": 2})], vec![]);
    let err = ingest_snapshot(&mut conn, &late, &PipelineConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    assert_eq!(err.crawl_id(), Some("2026-05-02"));

    assert_eq!(crawls::list_crawls(&conn).unwrap().len(), 2);
    recompute_changes(&mut conn, "2026-05-03", &PipelineConfig::default()).unwrap();
    let stored = changes::changes_for_crawl(&conn, "2026-05-03").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.previous_crawl_id, "2026-05-01");
    let m1 = entities::get_entity(&conn, EntityType::Model, "m1").unwrap().unwrap();
    assert_eq!(m1.attributes["context_length"], json!(3));
}

fn created(entity_type: EntityType, value: serde_json::Value) -> ChangeSet {
    let config = PipelineConfig::default();
    let extractor = ChangeExtractor::new(
        "2026-05-01",
        "2026-05-02",
        entity_type,
        config.volatile_fields.clone(),
        config.diff_options(),
    );
    let entity = Entity::from_value(entity_type, 0, value).unwrap();
    ChangeSet {
        previous_crawl_id: "2026-05-01".into(),
        crawl_id: "2026-05-02".into(),
        changes: extractor.extract_all(vec![], vec![entity]),
    }
}

#[test]
fn test_colliding_change_set_writes_nothing_for_the_pair() {
    let (_dir, mut conn) = setup_db();
    let endpoints = created(EntityType::Endpoint, endpoint("e1", "m1", 8));
    let mut models = created(EntityType::Model, json!({"slug": "m1"}));
    let duplicate = models.changes[0].clone();
    models.changes.push(duplicate);

    let err = reconcile_change_sets(
        &mut conn,
        "2026-05-02",
        vec![(EntityType::Endpoint, endpoints.clone()), (EntityType::Model, models)],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::DuplicateChangeKey);
    assert_eq!(err.entity_type(), Some("model"));
    assert_eq!(changes::count_changes(&conn, "2026-05-02").unwrap(), 0);
    assert!(days::list_change_days(&conn).unwrap().is_empty());

    let counts = reconcile_change_sets(
        &mut conn,
        "2026-05-02",
        vec![
            (EntityType::Endpoint, endpoints),
            (EntityType::Model, created(EntityType::Model, json!({"slug": "m1"}))),
        ],
    )
    .unwrap();
    assert_eq!(counts[&EntityType::Endpoint].insert, 1);
    assert_eq!(counts[&EntityType::Model].insert, 1);
    assert_eq!(days::list_change_days(&conn).unwrap()[0].change_count, 2);
}
