//! Crawl ledger
//!
//! One row per ingested crawl. Adjacency ("the previous crawl") is the
//! greatest crawl id below a given one, so crawl ids must sort in crawl
//! order.

#![allow(clippy::result_large_err)]

use crate::db::{from_millis, to_millis};
use crate::errors::{from_rusqlite, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

/// A row from the `crawls` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlRow {
    pub crawl_id: String,
    pub crawled_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl CrawlRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            crawl_id: row.get(0)?,
            crawled_at: from_millis(row.get(1)?),
            ingested_at: from_millis(row.get(2)?),
        })
    }

    /// UTC calendar day the crawl was taken, `YYYY-MM-DD`
    pub fn day(&self) -> String {
        self.crawled_at.date_naive().to_string()
    }
}

/// Record a crawl in the ledger.
///
/// Returns `false` when the crawl id was already recorded; the existing row
/// (including its original `crawled_at`) is kept.
pub fn record_crawl(
    conn: &Connection,
    crawl_id: &str,
    crawled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO crawls (crawl_id, crawled_at, ingested_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(crawl_id) DO NOTHING",
            rusqlite::params![crawl_id, to_millis(crawled_at), to_millis(now)],
        )
        .map_err(from_rusqlite)?;
    Ok(inserted == 1)
}

pub fn get_crawl(conn: &Connection, crawl_id: &str) -> Result<Option<CrawlRow>> {
    conn.query_row(
        "SELECT crawl_id, crawled_at, ingested_at FROM crawls WHERE crawl_id = ?1",
        [crawl_id],
        CrawlRow::from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// The crawl immediately preceding `crawl_id`, if any
pub fn previous_crawl(conn: &Connection, crawl_id: &str) -> Result<Option<CrawlRow>> {
    conn.query_row(
        "SELECT crawl_id, crawled_at, ingested_at FROM crawls
         WHERE crawl_id < ?1 ORDER BY crawl_id DESC LIMIT 1",
        [crawl_id],
        CrawlRow::from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// The crawl immediately following `crawl_id`, if any
pub fn next_crawl(conn: &Connection, crawl_id: &str) -> Result<Option<CrawlRow>> {
    conn.query_row(
        "SELECT crawl_id, crawled_at, ingested_at FROM crawls
         WHERE crawl_id > ?1 ORDER BY crawl_id ASC LIMIT 1",
        [crawl_id],
        CrawlRow::from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// The newest crawl in the ledger
pub fn latest_crawl(conn: &Connection) -> Result<Option<CrawlRow>> {
    conn.query_row(
        "SELECT crawl_id, crawled_at, ingested_at FROM crawls ORDER BY crawl_id DESC LIMIT 1",
        [],
        CrawlRow::from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// All crawls, newest first
pub fn list_crawls(conn: &Connection) -> Result<Vec<CrawlRow>> {
    let mut stmt = conn
        .prepare("SELECT crawl_id, crawled_at, ingested_at FROM crawls ORDER BY crawl_id DESC")
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([], CrawlRow::from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows)
}
