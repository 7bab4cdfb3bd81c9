//! Feed assembly: crawl-grouped, cursor-paginated change history.
//!
//! Groups are emitted newest crawl first. The cursor is the base64 of the
//! last emitted crawl id, so a page boundary always falls between groups.

use crate::change::{ChangeKind, StoredChange};
use crate::config::FeedConfig;
use crate::entity::EntityType;
use crate::errors::CrawlDiffError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// All stored changes of one crawl, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedGroup {
    pub crawl_id: String,
    pub changes: Vec<StoredChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedGroup>,
    pub next_cursor: Option<String>,
    pub done: bool,
}

impl FeedPage {
    pub fn change_count(&self) -> usize {
        self.items.iter().map(|g| g.changes.len()).sum()
    }
}

/// Read access the assembler needs. Each call is one small bounded read.
pub trait FeedSource {
    type Error: From<CrawlDiffError>;

    /// Greatest crawl id with stored changes, strictly below `before` when given.
    fn latest_crawl_before(&mut self, before: Option<&str>) -> Result<Option<String>, Self::Error>;

    /// Every stored change of one crawl, any order.
    fn changes_for_crawl(&mut self, crawl_id: &str) -> Result<Vec<StoredChange>, Self::Error>;
}

pub fn encode_cursor(crawl_id: &str) -> String {
    STANDARD.encode(crawl_id.as_bytes())
}

/// # Errors
///
/// `InvalidCursor` when the cursor is not base64 of a non-empty UTF-8 crawl id.
pub fn decode_cursor(cursor: &str) -> Result<String, CrawlDiffError> {
    let bytes = STANDARD
        .decode(cursor.trim())
        .map_err(|e| CrawlDiffError::InvalidCursor {
            reason: e.to_string(),
        })?;
    let crawl_id = String::from_utf8(bytes).map_err(|_| CrawlDiffError::InvalidCursor {
        reason: "cursor does not decode to UTF-8".to_string(),
    })?;
    if crawl_id.is_empty() {
        return Err(CrawlDiffError::InvalidCursor {
            reason: "cursor decodes to an empty crawl id".to_string(),
        });
    }
    Ok(crawl_id)
}

fn priority(change: &StoredChange) -> u8 {
    match (change.record.entity_type, change.record.change_kind) {
        (EntityType::Model, ChangeKind::Delete) => 0,
        (EntityType::Endpoint, _) => 1,
        (EntityType::Model, _) => 2,
        (EntityType::Provider, _) => 3,
    }
}

type SortKey<'a> = (u8, [&'a str; 3], ChangeKind, &'a str, &'a str, i64);

fn sort_key(change: &StoredChange) -> SortKey<'_> {
    let r = &change.record;
    let model = r.model_slug.as_deref().unwrap_or("");
    let provider = r.provider_slug.as_deref().unwrap_or("");
    let tag = r.provider_tag_slug.as_deref().unwrap_or("");
    let endpoint = r.endpoint_uuid.as_deref().unwrap_or("");
    let path = r.path.as_str();

    let rank = priority(change);
    let primary = match rank {
        1 => [tag, model, path],
        3 => [provider, path, ""],
        _ => [model, path, ""],
    };
    (rank, primary, r.change_kind, endpoint, provider, change.id)
}

/// Put one crawl group in display order: model deletes, endpoint changes,
/// model creates/updates, provider changes. Total over distinct ids.
pub fn sort_feed_group(changes: &mut [StoredChange]) {
    changes.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
}

/// Assemble one page.
///
/// Stops after `config.max_groups` groups or once `page_size_goal` changes
/// have been emitted, whichever comes first. A group is never split, so a
/// page may overshoot the goal. `page_size_goal == 0` means the configured
/// default.
///
/// # Errors
///
/// `InvalidCursor` for an undecodable cursor, otherwise whatever the source
/// raises.
pub fn paginate<S: FeedSource>(
    source: &mut S,
    cursor: Option<&str>,
    page_size_goal: usize,
    config: &FeedConfig,
) -> Result<FeedPage, S::Error> {
    let mut bound = match cursor {
        Some(c) => Some(decode_cursor(c)?),
        None => None,
    };
    let goal = if page_size_goal == 0 {
        config.default_page_size_goal
    } else {
        page_size_goal
    };

    let mut items: Vec<FeedGroup> = Vec::new();
    let mut emitted = 0usize;
    let mut done = false;

    while items.len() < config.max_groups && emitted < goal {
        let Some(crawl_id) = source.latest_crawl_before(bound.as_deref())? else {
            done = true;
            break;
        };
        let mut changes = source.changes_for_crawl(&crawl_id)?;
        sort_feed_group(&mut changes);
        emitted += changes.len();
        bound = Some(crawl_id.clone());
        items.push(FeedGroup { crawl_id, changes });
    }

    if !done {
        done = source.latest_crawl_before(bound.as_deref())?.is_none();
    }

    let next_cursor = match items.last() {
        Some(group) => Some(encode_cursor(&group.crawl_id)),
        None => cursor.map(str::to_string),
    };

    Ok(FeedPage {
        items,
        next_cursor,
        done,
    })
}
