//! Engine-level read-only query surface.
//!
//! `apply_engine_query` is the single entry point for read-only queries.
//! Unlike `apply_engine_command`, it takes a shared connection and never
//! writes.

#![allow(clippy::result_large_err)]

use crate::commands::feed::{list_change_days, paginate_feed};
use crawldiff_core::classify::{classify, ChangeShape};
use crawldiff_core::errors::{ExError, ExErrorKind};
use crawldiff_core::feed::{sort_feed_group, FeedPage};
use crawldiff_core::{EntityType, PipelineConfig};
use crawldiff_store::errors::Result;
use crawldiff_store::repo::{changes, crawls, entities};
use crawldiff_store::{ChangeDay, CrawlRow, EntityRow};
use rusqlite::Connection;
use serde::Serialize;

/// Read-only queries supported by the engine.
#[derive(Debug, Clone)]
pub enum EngineQuery {
    /// One page of the change feed
    Feed {
        cursor: Option<String>,
        page_size_goal: Option<usize>,
    },
    /// Days with stored changes
    ChangeDays,
    /// The crawl ledger, newest first
    Crawls,
    /// One materialized entity
    EntityGet {
        entity_type: EntityType,
        entity_key: String,
    },
    /// Shapes of every stored change of one crawl, in feed order
    ClassifyCrawl { crawl_id: String },
}

/// Shape of one stored change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedChange {
    pub id: i64,
    pub entity_type: EntityType,
    pub path: String,
    pub shape: ChangeShape,
}

/// Result of an engine query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EngineQueryResult {
    Feed(FeedPage),
    ChangeDays(Vec<ChangeDay>),
    Crawls(Vec<CrawlRow>),
    EntityGet(EntityRow),
    ClassifyCrawl(Vec<ClassifiedChange>),
}

/// Apply a read-only query.
///
/// ## Errors
///
/// - `NotFound`: entity or crawl unknown
/// - `InvalidCursor`: undecodable feed cursor
/// - `Persistence`: store failure
pub fn apply_engine_query(
    query: EngineQuery,
    conn: &Connection,
    config: &PipelineConfig,
) -> Result<EngineQueryResult> {
    match query {
        EngineQuery::Feed {
            cursor,
            page_size_goal,
        } => paginate_feed(conn, cursor.as_deref(), page_size_goal, &config.feed)
            .map(EngineQueryResult::Feed),
        EngineQuery::ChangeDays => list_change_days(conn).map(EngineQueryResult::ChangeDays),
        EngineQuery::Crawls => crawls::list_crawls(conn).map(EngineQueryResult::Crawls),
        EngineQuery::EntityGet {
            entity_type,
            entity_key,
        } => entities::get_entity(conn, entity_type, &entity_key)?
            .map(EngineQueryResult::EntityGet)
            .ok_or_else(|| {
                ExError::new(ExErrorKind::NotFound)
                    .with_op("entity_get")
                    .with_entity_type(entity_type.as_str())
                    .with_entity_key(entity_key)
                    .with_message("entity not found")
            }),
        EngineQuery::ClassifyCrawl { crawl_id } => {
            if crawls::get_crawl(conn, &crawl_id)?.is_none() {
                return Err(ExError::new(ExErrorKind::NotFound)
                    .with_op("classify_crawl")
                    .with_crawl_id(crawl_id)
                    .with_message("crawl not found"));
            }
            let mut stored = changes::changes_for_crawl(conn, &crawl_id)?;
            sort_feed_group(&mut stored);
            Ok(EngineQueryResult::ClassifyCrawl(
                stored
                    .into_iter()
                    .map(|c| ClassifiedChange {
                        id: c.id,
                        entity_type: c.record.entity_type,
                        shape: classify(&c.record.diff),
                        path: c.record.path,
                    })
                    .collect(),
            ))
        }
    }
}
