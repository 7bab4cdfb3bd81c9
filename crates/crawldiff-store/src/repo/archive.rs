//! Per-crawl entity archive
//!
//! Every crawl's raw entity versions are kept so the extractor can diff two
//! adjacent crawls without holding either in memory.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, json_error, Result};
use crawldiff_core::errors::ExError;
use crawldiff_core::{Entity, EntityType};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::VecDeque;

/// Replace the archived versions of one entity type for one crawl.
///
/// Runs in its own transaction; a re-ingested crawl drops rows its new
/// snapshot no longer carries.
pub fn archive_entities(
    conn: &mut Connection,
    crawl_id: &str,
    entity_type: EntityType,
    entities: &[Entity],
) -> Result<usize> {
    let tx = conn.transaction().map_err(from_rusqlite)?;
    tx.execute(
        "DELETE FROM snapshot_entities WHERE crawl_id = ?1 AND entity_type = ?2",
        rusqlite::params![crawl_id, entity_type.as_str()],
    )
    .map_err(from_rusqlite)?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO snapshot_entities (crawl_id, entity_type, entity_key, attributes_json)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(from_rusqlite)?;
        for entity in entities {
            let json = serde_json::to_string(&entity.attributes)
                .map_err(|e| json_error("archive_entities", e))?;
            stmt.execute(rusqlite::params![
                crawl_id,
                entity_type.as_str(),
                entity.key,
                json
            ])
            .map_err(from_rusqlite)?;
        }
    }
    tx.commit().map_err(from_rusqlite)?;
    Ok(entities.len())
}

pub fn count_archived(conn: &Connection, crawl_id: &str, entity_type: EntityType) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM snapshot_entities WHERE crawl_id = ?1 AND entity_type = ?2",
            rusqlite::params![crawl_id, entity_type.as_str()],
            |row| row.get(0),
        )
        .map_err(from_rusqlite)?;
    Ok(count as usize)
}

/// Keyset scan over one crawl's archived entities, ascending by natural key.
///
/// Reads `batch_size` rows at a time; the first error ends the scan.
pub struct ArchiveScan<'conn> {
    conn: &'conn Connection,
    crawl_id: String,
    entity_type: EntityType,
    batch_size: usize,
    last_key: Option<String>,
    buffer: VecDeque<Entity>,
    exhausted: bool,
}

impl<'conn> ArchiveScan<'conn> {
    pub fn new(
        conn: &'conn Connection,
        crawl_id: impl Into<String>,
        entity_type: EntityType,
        batch_size: usize,
    ) -> Self {
        Self {
            conn,
            crawl_id: crawl_id.into(),
            entity_type,
            batch_size: batch_size.max(1),
            last_key: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT entity_key, attributes_json FROM snapshot_entities
                 WHERE crawl_id = ?1 AND entity_type = ?2 AND (?3 IS NULL OR entity_key > ?3)
                 ORDER BY entity_key LIMIT ?4",
            )
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    self.crawl_id,
                    self.entity_type.as_str(),
                    self.last_key,
                    self.batch_size as i64
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        if rows.len() < self.batch_size {
            self.exhausted = true;
        }
        for (key, json) in rows {
            let value: Value =
                serde_json::from_str(&json).map_err(|e| json_error("archive_scan", e))?;
            let entity = Entity::from_value(self.entity_type, 0, value).map_err(ExError::from)?;
            self.last_key = Some(key);
            self.buffer.push_back(entity);
        }
        Ok(())
    }
}

impl Iterator for ArchiveScan<'_> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entity) = self.buffer.pop_front() {
            return Some(Ok(entity));
        }
        if self.exhausted {
            return None;
        }
        match self.fetch_batch() {
            Ok(()) => self.buffer.pop_front().map(Ok),
            Err(e) => {
                self.exhausted = true;
                self.buffer.clear();
                Some(Err(e))
            }
        }
    }
}
