//! Change record persistence and the feed read path

#![allow(clippy::result_large_err)]

use crate::db::{from_millis, to_millis};
use crate::errors::{from_rusqlite, json_error, Result};
use chrono::{DateTime, Utc};
use crawldiff_core::change::{ChangeRecord, ReconcilePlan, StoredChange};
use crawldiff_core::errors::{CrawlDiffError, ExError};
use crawldiff_core::feed::FeedSource;
use crawldiff_core::EntityType;
use rusqlite::{Connection, Row, Transaction};
use serde_json::Value;

const SELECT_COLUMNS: &str = "SELECT id, crawl_id, previous_crawl_id, entity_type, change_kind,
        model_slug, provider_slug, provider_tag_slug, endpoint_uuid,
        path, path_level_1, path_level_2, before_json, after_json, diff_json,
        created_at, updated_at
    FROM change_records";

/// Row as read, before the enum columns are parsed.
struct RawChange {
    id: i64,
    crawl_id: String,
    previous_crawl_id: String,
    entity_type: String,
    change_kind: String,
    model_slug: Option<String>,
    provider_slug: Option<String>,
    provider_tag_slug: Option<String>,
    endpoint_uuid: Option<String>,
    path: String,
    path_level_1: Option<String>,
    path_level_2: Option<String>,
    before_json: String,
    after_json: String,
    diff_json: String,
    created_at: i64,
    updated_at: i64,
}

impl RawChange {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            crawl_id: row.get(1)?,
            previous_crawl_id: row.get(2)?,
            entity_type: row.get(3)?,
            change_kind: row.get(4)?,
            model_slug: row.get(5)?,
            provider_slug: row.get(6)?,
            provider_tag_slug: row.get(7)?,
            endpoint_uuid: row.get(8)?,
            path: row.get(9)?,
            path_level_1: row.get(10)?,
            path_level_2: row.get(11)?,
            before_json: row.get(12)?,
            after_json: row.get(13)?,
            diff_json: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    /// Unparseable JSON columns read as `null`; unknown enum names fail.
    fn into_stored(self) -> std::result::Result<StoredChange, CrawlDiffError> {
        let json = |s: &str| serde_json::from_str(s).unwrap_or(Value::Null);
        Ok(StoredChange {
            id: self.id,
            record: ChangeRecord {
                entity_type: self.entity_type.parse()?,
                change_kind: self.change_kind.parse()?,
                before: json(&self.before_json),
                after: json(&self.after_json),
                diff: json(&self.diff_json),
                crawl_id: self.crawl_id,
                previous_crawl_id: self.previous_crawl_id,
                model_slug: self.model_slug,
                provider_slug: self.provider_slug,
                provider_tag_slug: self.provider_tag_slug,
                endpoint_uuid: self.endpoint_uuid,
                path: self.path,
                path_level_1: self.path_level_1,
                path_level_2: self.path_level_2,
            },
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

fn query_raw(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<RawChange>> {
    let mut stmt = conn.prepare_cached(sql).map_err(from_rusqlite)?;
    let rows = stmt
        .query_map(params, RawChange::from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows)
}

/// Stored records of one crawl pair and entity type, ordered by id.
///
/// A row with an unknown entity type or change kind is an error here: the
/// reconciler must see every row it may have to replace or delete.
pub fn load_changes(
    conn: &Connection,
    previous_crawl_id: &str,
    crawl_id: &str,
    entity_type: EntityType,
) -> Result<Vec<StoredChange>> {
    let sql = format!(
        "{} WHERE previous_crawl_id = ?1 AND crawl_id = ?2 AND entity_type = ?3 ORDER BY id",
        SELECT_COLUMNS
    );
    query_raw(
        conn,
        &sql,
        rusqlite::params![previous_crawl_id, crawl_id, entity_type.as_str()],
    )?
    .into_iter()
    .map(|raw| {
        let id = raw.id;
        raw.into_stored()
            .map_err(|e| ExError::from(e).with_op("load_changes").with_entity_key(id.to_string()))
    })
    .collect()
}

/// Every stored record of one crawl, any order.
///
/// Rows that cannot be decoded are skipped with a warning.
pub fn changes_for_crawl(conn: &Connection, crawl_id: &str) -> Result<Vec<StoredChange>> {
    let sql = format!("{} WHERE crawl_id = ?1", SELECT_COLUMNS);
    let rows = query_raw(conn, &sql, [crawl_id])?;
    Ok(rows
        .into_iter()
        .filter_map(|raw| {
            let id = raw.id;
            match raw.into_stored() {
                Ok(change) => Some(change),
                Err(e) => {
                    tracing::warn!(change_id = id, crawl_id, error = %e, "skipping undecodable change record");
                    None
                }
            }
        })
        .collect())
}

/// Greatest crawl id with stored changes, strictly below `before` when given
pub fn latest_crawl_with_changes(conn: &Connection, before: Option<&str>) -> Result<Option<String>> {
    conn.query_row(
        "SELECT MAX(crawl_id) FROM change_records WHERE (?1 IS NULL OR crawl_id < ?1)",
        [before],
        |row| row.get(0),
    )
    .map_err(from_rusqlite)
}

pub fn count_changes(conn: &Connection, crawl_id: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM change_records WHERE crawl_id = ?1",
            [crawl_id],
            |row| row.get(0),
        )
        .map_err(from_rusqlite)?;
    Ok(count as usize)
}

fn json_text(value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| json_error("apply_reconciliation", e))
}

fn insert_change(tx: &Transaction<'_>, change: &ChangeRecord, now: i64) -> Result<()> {
    tx.execute(
        "INSERT INTO change_records
            (crawl_id, previous_crawl_id, entity_type, change_kind,
             model_slug, provider_slug, provider_tag_slug, endpoint_uuid,
             path, path_level_1, path_level_2, before_json, after_json, diff_json,
             change_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
        rusqlite::params![
            change.crawl_id,
            change.previous_crawl_id,
            change.entity_type.as_str(),
            change.change_kind.as_str(),
            change.model_slug,
            change.provider_slug,
            change.provider_tag_slug,
            change.endpoint_uuid,
            change.path,
            change.path_level_1,
            change.path_level_2,
            json_text(&change.before)?,
            json_text(&change.after)?,
            json_text(&change.diff)?,
            change.change_key(),
            now,
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

fn update_change(tx: &Transaction<'_>, id: i64, change: &ChangeRecord, now: i64) -> Result<()> {
    tx.execute(
        "UPDATE change_records SET
            path_level_1 = ?1, path_level_2 = ?2,
            before_json = ?3, after_json = ?4, diff_json = ?5,
            updated_at = ?6
         WHERE id = ?7",
        rusqlite::params![
            change.path_level_1,
            change.path_level_2,
            json_text(&change.before)?,
            json_text(&change.after)?,
            json_text(&change.diff)?,
            now,
            id,
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Apply the reconciliation plans of one crawl pair (one per entity type)
/// in a single transaction.
///
/// `day` is the crawl's calendar day; its `change_days` count moves by
/// inserts minus deletes in the same transaction and never drops below zero.
pub fn apply_reconciliation(
    conn: &mut Connection,
    day: &str,
    plans: &[ReconcilePlan],
    now: DateTime<Utc>,
) -> Result<()> {
    let is_noop = |p: &ReconcilePlan| p.inserts.is_empty() && p.updates.is_empty() && p.deletes.is_empty();
    if plans.iter().all(is_noop) {
        return Ok(());
    }
    let now = to_millis(now);
    let tx = conn.transaction().map_err(from_rusqlite)?;

    let mut delta = 0i64;
    for plan in plans {
        for change in &plan.inserts {
            insert_change(&tx, change, now)?;
        }
        for (id, change) in &plan.updates {
            update_change(&tx, *id, change, now)?;
        }
        for stale in &plan.deletes {
            tx.execute("DELETE FROM change_records WHERE id = ?1", [stale.id])
                .map_err(from_rusqlite)?;
        }
        delta += plan.inserts.len() as i64 - plan.deletes.len() as i64;
    }

    if delta != 0 {
        tx.execute(
            "INSERT INTO change_days (day, change_count) VALUES (?1, MAX(0, ?2))
             ON CONFLICT(day) DO UPDATE SET change_count = MAX(0, change_count + ?2)",
            rusqlite::params![day, delta],
        )
        .map_err(from_rusqlite)?;
    }

    tx.commit().map_err(from_rusqlite)?;
    Ok(())
}

/// Feed reads against a SQLite connection
pub struct SqliteFeedSource<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFeedSource<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FeedSource for SqliteFeedSource<'_> {
    type Error = ExError;

    fn latest_crawl_before(&mut self, before: Option<&str>) -> Result<Option<String>> {
        latest_crawl_with_changes(self.conn, before)
    }

    fn changes_for_crawl(&mut self, crawl_id: &str) -> Result<Vec<StoredChange>> {
        changes_for_crawl(self.conn, crawl_id)
    }
}
