//! Current-state entity tables

#![allow(clippy::result_large_err)]

use crate::db::{from_millis, to_millis};
use crate::errors::{from_rusqlite, json_error, Result};
use chrono::{DateTime, Utc};
use crawldiff_core::materialize::{CurrentEntity, EntityWrite, MaterializationPlan};
use crawldiff_core::{EntityState, EntityType};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::Value;

/// A materialized entity as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRow {
    pub entity_type: EntityType,
    pub entity_key: String,
    pub attributes: Value,
    pub content_digest: String,
    /// Crawl that last wrote the row
    pub crawl_id: String,
    pub unavailable_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Load `(key, digest, state)` for every stored entity of one type.
///
/// Reads in keyset batches of `batch_size`; attribute payloads are never
/// loaded.
pub fn scan_current(
    conn: &Connection,
    entity_type: EntityType,
    batch_size: usize,
) -> Result<Vec<CurrentEntity>> {
    let batch_size = batch_size.max(1);
    let mut stmt = conn
        .prepare(
            "SELECT entity_key, content_digest, unavailable_at FROM entities
             WHERE entity_type = ?1 AND (?2 IS NULL OR entity_key > ?2)
             ORDER BY entity_key LIMIT ?3",
        )
        .map_err(from_rusqlite)?;

    let mut out = Vec::new();
    let mut last_key: Option<String> = None;
    loop {
        let batch = stmt
            .query_map(
                rusqlite::params![entity_type.as_str(), last_key, batch_size as i64],
                |row| {
                    let unavailable_at: Option<i64> = row.get(2)?;
                    Ok(CurrentEntity {
                        key: row.get(0)?,
                        content_digest: row.get(1)?,
                        state: EntityState::from_unavailable_at(unavailable_at.map(from_millis)),
                    })
                },
            )
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        let full = batch.len() == batch_size;
        last_key = batch.last().map(|c| c.key.clone());
        out.extend(batch);
        if !full {
            break;
        }
    }
    Ok(out)
}

fn write_entity(
    tx: &Transaction<'_>,
    entity_type: EntityType,
    write: &EntityWrite,
    crawl_id: &str,
    now: i64,
) -> Result<()> {
    let json = serde_json::to_string(&write.entity.attributes)
        .map_err(|e| json_error("apply_materialization", e))?;
    tx.execute(
        "INSERT INTO entities
            (entity_type, entity_key, attributes_json, content_digest, crawl_id, unavailable_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(entity_type, entity_key) DO UPDATE SET
            attributes_json = excluded.attributes_json,
            content_digest = excluded.content_digest,
            crawl_id = excluded.crawl_id,
            unavailable_at = excluded.unavailable_at,
            updated_at = excluded.updated_at",
        rusqlite::params![
            entity_type.as_str(),
            write.entity.key,
            json,
            write.content_digest,
            crawl_id,
            write.state.unavailable_at().map(to_millis),
            now,
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Apply a materialization plan in one transaction.
pub fn apply_materialization(
    conn: &mut Connection,
    crawl_id: &str,
    plan: &MaterializationPlan,
    now: DateTime<Utc>,
) -> Result<()> {
    if plan.is_noop() {
        return Ok(());
    }
    let now = to_millis(now);
    let tx = conn.transaction().map_err(from_rusqlite)?;

    for write in plan.inserts.iter().chain(plan.replaces.iter()) {
        write_entity(&tx, plan.entity_type, write, crawl_id, now)?;
    }
    for change in &plan.state_changes {
        tx.execute(
            "UPDATE entities SET unavailable_at = ?1, updated_at = ?2
             WHERE entity_type = ?3 AND entity_key = ?4",
            rusqlite::params![
                change.state.unavailable_at().map(to_millis),
                now,
                plan.entity_type.as_str(),
                change.key,
            ],
        )
        .map_err(from_rusqlite)?;
    }

    tx.commit().map_err(from_rusqlite)?;
    Ok(())
}

pub fn get_entity(
    conn: &Connection,
    entity_type: EntityType,
    entity_key: &str,
) -> Result<Option<EntityRow>> {
    let row = conn
        .query_row(
            "SELECT attributes_json, content_digest, crawl_id, unavailable_at, created_at, updated_at
             FROM entities WHERE entity_type = ?1 AND entity_key = ?2",
            rusqlite::params![entity_type.as_str(), entity_key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()
        .map_err(from_rusqlite)?;

    Ok(row.map(
        |(json, content_digest, crawl_id, unavailable_at, created_at, updated_at)| EntityRow {
            entity_type,
            entity_key: entity_key.to_string(),
            attributes: serde_json::from_str(&json).unwrap_or(Value::Null),
            content_digest,
            crawl_id,
            unavailable_at: unavailable_at.map(from_millis),
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        },
    ))
}

/// Stored entity count of one type, split into `(active, unavailable)`
pub fn count_entities(conn: &Connection, entity_type: EntityType) -> Result<(usize, usize)> {
    conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN unavailable_at IS NULL THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN unavailable_at IS NULL THEN 0 ELSE 1 END), 0)
         FROM entities WHERE entity_type = ?1",
        [entity_type.as_str()],
        |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as usize)),
    )
    .map_err(from_rusqlite)
}
