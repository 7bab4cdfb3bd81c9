//! Change-set reconciliation planning.
//!
//! Converges the stored records of one crawl pair onto a freshly computed
//! set. Re-running the extractor for the same pair therefore never
//! duplicates history: matching records stay, stale ones are replaced, and
//! records the extractor no longer produces are deleted.

use crate::change::{ChangeRecord, StoredChange};
use crate::diff::{diff, DiffOptions};
use crate::errors::CrawlDiffError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Reconciler input: every fresh record for one crawl pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub previous_crawl_id: String,
    pub crawl_id: String,
    pub changes: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileCounts {
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
    pub stable: usize,
}

impl ReconcileCounts {
    pub fn merge(&mut self, other: ReconcileCounts) {
        self.insert += other.insert;
        self.update += other.update;
        self.delete += other.delete;
        self.stable += other.stable;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub inserts: Vec<ChangeRecord>,
    /// `(stored id, replacement)`
    pub updates: Vec<(i64, ChangeRecord)>,
    pub deletes: Vec<StoredChange>,
    pub counts: ReconcileCounts,
}

/// Plan the convergence of `stored` onto `fresh`.
///
/// # Errors
///
/// - `MismatchedCrawlPair`: a fresh record names a different crawl pair
/// - `DuplicateChangeKey`: two fresh records share a reconciliation key;
///   nothing should be written for the pair in that case
pub fn plan_reconciliation(
    fresh: ChangeSet,
    stored: Vec<StoredChange>,
) -> Result<ReconcilePlan, CrawlDiffError> {
    let expected = format!("{}..{}", fresh.previous_crawl_id, fresh.crawl_id);
    let mut seen = HashSet::with_capacity(fresh.changes.len());
    for change in &fresh.changes {
        let key = change.change_key();
        if change.crawl_id != fresh.crawl_id || change.previous_crawl_id != fresh.previous_crawl_id {
            return Err(CrawlDiffError::MismatchedCrawlPair {
                key,
                expected,
                found: change.crawl_pair(),
            });
        }
        if !seen.insert(key.clone()) {
            return Err(CrawlDiffError::DuplicateChangeKey { key });
        }
    }

    let mut by_key: HashMap<String, StoredChange> = stored
        .into_iter()
        .map(|s| (s.record.change_key(), s))
        .collect();

    let no_hints = DiffOptions::new();
    let mut plan = ReconcilePlan {
        inserts: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
        counts: ReconcileCounts::default(),
    };

    for change in fresh.changes {
        match by_key.remove(&change.change_key()) {
            None => {
                plan.counts.insert += 1;
                plan.inserts.push(change);
            }
            Some(existing) => {
                if diff(&existing.record.content(), &change.content(), &no_hints).is_none() {
                    plan.counts.stable += 1;
                } else {
                    plan.counts.update += 1;
                    plan.updates.push((existing.id, change));
                }
            }
        }
    }

    let mut stale: Vec<StoredChange> = by_key.into_values().collect();
    stale.sort_by_key(|s| s.id);
    plan.counts.delete = stale.len();
    plan.deletes = stale;

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use crate::entity::EntityType;
    use chrono::Utc;
    use serde_json::{json, Value};

    fn update(path: &str, after: Value) -> ChangeRecord {
        ChangeRecord {
            crawl_id: "c2".into(),
            previous_crawl_id: "c1".into(),
            entity_type: EntityType::Model,
            change_kind: ChangeKind::Update,
            model_slug: Some("m1".into()),
            provider_slug: None,
            provider_tag_slug: None,
            endpoint_uuid: None,
            path: path.into(),
            path_level_1: Some(path.into()),
            path_level_2: None,
            before: json!(1),
            after: after.clone(),
            diff: json!({"type": "UPDATE", "key": path, "oldValue": 1, "value": after}),
        }
    }

    fn stored(id: i64, record: ChangeRecord) -> StoredChange {
        StoredChange {
            id,
            record,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn set(changes: Vec<ChangeRecord>) -> ChangeSet {
        ChangeSet {
            previous_crawl_id: "c1".into(),
            crawl_id: "c2".into(),
            changes,
        }
    }

    #[test]
    fn test_insert_stable_update_delete() {
        let plan = plan_reconciliation(
            set(vec![update("a", json!(2)), update("b", json!(3)), update("c", json!(4))]),
            vec![
                stored(1, update("a", json!(2))),
                stored(2, update("b", json!(9))),
                stored(3, update("z", json!(0))),
            ],
        )
        .unwrap();
        assert_eq!(
            plan.counts,
            ReconcileCounts {
                insert: 1,
                update: 1,
                delete: 1,
                stable: 1
            }
        );
        assert_eq!(plan.updates[0].0, 2);
        assert_eq!(plan.deletes[0].id, 3);
        assert_eq!(plan.inserts[0].path, "c");
    }

    #[test]
    fn test_rerun_converges() {
        let fresh = vec![update("a", json!(2))];
        let plan = plan_reconciliation(set(fresh.clone()), vec![stored(1, fresh[0].clone())]).unwrap();
        assert_eq!(
            plan.counts,
            ReconcileCounts {
                stable: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_collision_rejected() {
        let err = plan_reconciliation(set(vec![update("a", json!(2)), update("a", json!(3))]), vec![])
            .unwrap_err();
        assert!(matches!(err, CrawlDiffError::DuplicateChangeKey { .. }));
    }

    #[test]
    fn test_foreign_pair_rejected() {
        let mut foreign = update("a", json!(2));
        foreign.crawl_id = "c3".into();
        let err = plan_reconciliation(set(vec![foreign]), vec![]).unwrap_err();
        assert!(matches!(err, CrawlDiffError::MismatchedCrawlPair { .. }));
    }
}
