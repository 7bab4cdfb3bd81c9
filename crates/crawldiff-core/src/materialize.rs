//! Materialization planning.
//!
//! Decides, for one entity table, which snapshot entities are inserted,
//! replaced or left alone, and which stored entities become unavailable.
//! The store applies the resulting [`MaterializationPlan`]; nothing here
//! touches storage.

use crate::entity::{Entity, EntityState, EntityType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the planner needs to know about a stored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentEntity {
    pub key: String,
    pub content_digest: String,
    pub state: EntityState,
}

/// A row to write in full (insert or replace).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityWrite {
    pub entity: Entity,
    pub content_digest: String,
    pub state: EntityState,
}

/// A lifecycle-only change for a stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub key: String,
    pub state: EntityState,
}

/// Per-table outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeCounts {
    pub stable: usize,
    pub update: usize,
    pub insert: usize,
    pub unavailable: usize,
}

/// Planner switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub reactivate_on_reappearance: bool,
}

/// Everything the store must do for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializationPlan {
    pub entity_type: EntityType,
    pub inserts: Vec<EntityWrite>,
    pub replaces: Vec<EntityWrite>,
    pub state_changes: Vec<StateChange>,
    pub counts: MaterializeCounts,
}

impl MaterializationPlan {
    /// True when applying the plan would not write anything
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.replaces.is_empty() && self.state_changes.is_empty()
    }
}

/// Plan the reconciliation of one table against a fresh snapshot.
///
/// `snapshot` must already be free of duplicate keys (see
/// [`crate::snapshot::Snapshot::entities`]). Entities in `current` that the
/// snapshot does not mention are marked unavailable at `crawled_at` unless
/// they already are.
pub fn plan_materialization(
    entity_type: EntityType,
    snapshot: Vec<Entity>,
    current: impl IntoIterator<Item = CurrentEntity>,
    volatile_fields: &[String],
    crawled_at: DateTime<Utc>,
    options: MaterializeOptions,
) -> MaterializationPlan {
    let mut lookup: HashMap<String, CurrentEntity> = current
        .into_iter()
        .map(|c| (c.key.clone(), c))
        .collect();

    let mut plan = MaterializationPlan {
        entity_type,
        inserts: Vec::new(),
        replaces: Vec::new(),
        state_changes: Vec::new(),
        counts: MaterializeCounts::default(),
    };

    for entity in snapshot {
        let digest = entity.content_digest(volatile_fields);
        match lookup.remove(&entity.key) {
            None => {
                plan.counts.insert += 1;
                plan.inserts.push(EntityWrite {
                    entity,
                    content_digest: digest,
                    state: EntityState::Active,
                });
            }
            Some(existing) => {
                let mut state = existing.state;
                let reactivated = options.reactivate_on_reappearance && state.reactivate();
                if existing.content_digest == digest && !reactivated {
                    plan.counts.stable += 1;
                } else {
                    plan.counts.update += 1;
                    plan.replaces.push(EntityWrite {
                        entity,
                        content_digest: digest,
                        state,
                    });
                }
            }
        }
    }

    let mut missing: Vec<CurrentEntity> = lookup.into_values().collect();
    missing.sort_by(|a, b| a.key.cmp(&b.key));
    for mut gone in missing {
        if gone.state.mark_unavailable(crawled_at) {
            plan.counts.unavailable += 1;
            plan.state_changes.push(StateChange {
                key: gone.key,
                state: gone.state,
            });
        }
    }

    plan
}
