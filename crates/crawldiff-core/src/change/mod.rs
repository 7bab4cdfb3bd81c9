//! Change records: one detected difference between two adjacent crawls.
//!
//! - [`extract`] computes fresh records from two snapshot versions
//! - [`reconcile`] plans their convergence against the stored set

pub mod extract;
pub mod reconcile;

pub use extract::ChangeExtractor;
pub use reconcile::{plan_reconciliation, ChangeSet, ReconcileCounts, ReconcilePlan};

use crate::entity::EntityType;
use crate::errors::CrawlDiffError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Separator between reconciliation key components.
const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = CrawlDiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeKind::Create),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            other => Err(CrawlDiffError::UnknownChangeKind {
                name: other.to_string(),
            }),
        }
    }
}

/// A change as computed by the extractor (no storage identity yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub crawl_id: String,
    pub previous_crawl_id: String,
    pub entity_type: EntityType,
    pub change_kind: ChangeKind,
    pub model_slug: Option<String>,
    pub provider_slug: Option<String>,
    pub provider_tag_slug: Option<String>,
    pub endpoint_uuid: Option<String>,
    /// Empty for create/delete, the top-level field for updates
    pub path: String,
    pub path_level_1: Option<String>,
    pub path_level_2: Option<String>,
    pub before: Value,
    pub after: Value,
    /// Wire form of the diff node, kept verbatim for classification
    pub diff: Value,
}

impl ChangeRecord {
    /// Reconciliation key, unique within one crawl pair.
    ///
    /// Absent identity fields render empty so the key stays total.
    pub fn change_key(&self) -> String {
        let parts = [
            self.entity_type.as_str(),
            self.change_kind.as_str(),
            self.model_slug.as_deref().unwrap_or(""),
            self.provider_slug.as_deref().unwrap_or(""),
            self.provider_tag_slug.as_deref().unwrap_or(""),
            self.endpoint_uuid.as_deref().unwrap_or(""),
            self.path.as_str(),
        ];
        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(part);
        }
        key
    }

    /// Fields that decide whether a stored record is stale
    pub fn content(&self) -> Value {
        json!({
            "before": self.before,
            "after": self.after,
            "diff": self.diff,
            "path_level_1": self.path_level_1,
            "path_level_2": self.path_level_2,
        })
    }

    /// `previous_crawl_id..crawl_id`, for messages
    pub fn crawl_pair(&self) -> String {
        format!("{}..{}", self.previous_crawl_id, self.crawl_id)
    }
}

/// First two `.`-separated segments of a path
pub fn path_levels(path: &str) -> (Option<String>, Option<String>) {
    if path.is_empty() {
        return (None, None);
    }
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    (
        segments.next().map(str::to_string),
        segments.next().map(str::to_string),
    )
}

/// A change record as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChange {
    pub id: i64,
    #[serde(flatten)]
    pub record: ChangeRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
