#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use crawldiff_core::change::{plan_reconciliation, ChangeExtractor, ChangeSet, StoredChange};
use crawldiff_core::classify::{classify, ChangeShape};
use crawldiff_core::diff::{diff, ArrayIdentity, ChangeType, DiffOptions};
use crawldiff_core::feed::sort_feed_group;
use crawldiff_core::materialize::{plan_materialization, CurrentEntity, MaterializeOptions};
use crawldiff_core::{ChangeKind, Entity, EntityState, EntityType, PipelineConfig};
use serde_json::{json, Value};

fn model(value: Value) -> Entity {
    Entity::from_value(EntityType::Model, 0, value).unwrap()
}

fn extractor(previous: &str, current: &str, entity_type: EntityType) -> ChangeExtractor {
    let config = PipelineConfig::default();
    ChangeExtractor::new(
        previous,
        current,
        entity_type,
        config.volatile_fields.clone(),
        config.diff_options(),
    )
}

fn store(records: Vec<crawldiff_core::ChangeRecord>) -> Vec<StoredChange> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| StoredChange {
            id: i as i64 + 1,
            record,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .collect()
}

#[test]
fn context_length_update_end_to_end() {
    let ex = extractor("c1", "c2", EntityType::Model);
    let records = ex.extract_all(
        vec![model(json!({"slug": "m1", "context_length": 4096}))],
        vec![model(json!({"slug": "m1", "context_length": 8192}))],
    );

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.change_kind, ChangeKind::Update);
    assert_eq!(record.path, "context_length");
    assert_eq!(record.before, json!(4096));
    assert_eq!(record.after, json!(8192));

    assert_eq!(
        classify(&record.diff),
        ChangeShape::ValueChange {
            change_type: ChangeType::Update,
            key: "context_length".to_string(),
            old_value: Some(json!(4096)),
            new_value: Some(json!(8192)),
        }
    );
}

#[test]
fn embedded_key_array_yields_one_array_change() {
    let options = DiffOptions::new().with_embedded_key("tags", ArrayIdentity::Value);
    let root = diff(&json!({"tags": ["a", "b"]}), &json!({"tags": ["b", "c"]}), &options).unwrap();

    assert_eq!(root.children().len(), 1);
    match classify(&root.children()[0].to_value()) {
        ChangeShape::ArrayChange {
            key,
            added,
            removed,
            ..
        } => {
            assert_eq!(key, "tags");
            assert_eq!(added, vec![json!("c")]);
            assert_eq!(removed, vec![json!("a")]);
        }
        other => panic!("expected array change, got {:?}", other),
    }
}

#[test]
fn absence_lifecycle_sets_marker_once() {
    let crawl_2 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let crawl_3 = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
    let x = model(json!({"slug": "x"}));
    let y = model(json!({"slug": "y"}));

    let current = |state_y: EntityState| {
        vec![
            CurrentEntity {
                key: "x".to_string(),
                content_digest: x.content_digest(&[]),
                state: EntityState::Active,
            },
            CurrentEntity {
                key: "y".to_string(),
                content_digest: y.content_digest(&[]),
                state: state_y,
            },
        ]
    };

    let second = plan_materialization(
        EntityType::Model,
        vec![x.clone()],
        current(EntityState::Active),
        &[],
        crawl_2,
        MaterializeOptions::default(),
    );
    assert_eq!(second.counts.unavailable, 1);
    assert_eq!(second.counts.stable, 1);
    let marked = second.state_changes[0].state;
    assert_eq!(marked.unavailable_at(), Some(crawl_2));

    let third = plan_materialization(
        EntityType::Model,
        vec![x.clone()],
        current(marked),
        &[],
        crawl_3,
        MaterializeOptions::default(),
    );
    assert_eq!(third.counts.unavailable, 0);
    assert!(third.is_noop());
}

#[test]
fn reverted_value_deletes_stored_record() {
    let ex = extractor("c1", "c2", EntityType::Model);
    let first = ex.extract_all(
        vec![model(json!({"slug": "m1", "context_length": 4096}))],
        vec![model(json!({"slug": "m1", "context_length": 8192}))],
    );
    let stored = store(first);

    // upstream reverted before the pair was recomputed
    let fresh = ex.extract_all(
        vec![model(json!({"slug": "m1", "context_length": 4096}))],
        vec![model(json!({"slug": "m1", "context_length": 4096}))],
    );
    let plan = plan_reconciliation(
        ChangeSet {
            previous_crawl_id: "c1".to_string(),
            crawl_id: "c2".to_string(),
            changes: fresh,
        },
        stored,
    )
    .unwrap();

    assert_eq!(plan.counts.delete, 1);
    assert_eq!(plan.counts.insert, 0);
}

#[test]
fn recompute_with_same_inputs_converges() {
    let ex = extractor("c1", "c2", EntityType::Model);
    let before = vec![model(json!({"slug": "m1", "input_modalities": ["text"], "pricing": {"prompt": "1"}}))];
    let after = vec![model(json!({"slug": "m1", "input_modalities": ["text", "image"], "pricing": {"prompt": "2"}}))];

    let stored = store(ex.extract_all(before.clone(), after.clone()));
    let plan = plan_reconciliation(
        ChangeSet {
            previous_crawl_id: "c1".to_string(),
            crawl_id: "c2".to_string(),
            changes: ex.extract_all(before, after),
        },
        stored,
    )
    .unwrap();

    assert_eq!(plan.counts.stable, 2);
    assert_eq!(plan.counts.insert + plan.counts.update + plan.counts.delete, 0);
}

#[test]
fn feed_group_orders_delete_endpoint_create() {
    let models = extractor("c1", "c2", EntityType::Model);
    let endpoints = extractor("c1", "c2", EntityType::Endpoint);

    let mut records = models.extract_all(
        vec![model(json!({"slug": "old"}))],
        vec![model(json!({"slug": "new"}))],
    );
    let endpoint = |ctx: u32| {
        Entity::from_value(
            EntityType::Endpoint,
            0,
            json!({"uuid": "e1", "model_slug": "new", "provider_slug": "p", "context_length": ctx}),
        )
        .unwrap()
    };
    records.extend(endpoints.extract_all(vec![endpoint(1)], vec![endpoint(2)]));

    let mut group = store(records);
    group.reverse();
    sort_feed_group(&mut group);

    let order: Vec<_> = group
        .iter()
        .map(|c| (c.record.entity_type, c.record.change_kind))
        .collect();
    assert_eq!(
        order,
        vec![
            (EntityType::Model, ChangeKind::Delete),
            (EntityType::Endpoint, ChangeKind::Update),
            (EntityType::Model, ChangeKind::Create),
        ]
    );
}
