//! Per-day change count index

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeDay {
    /// `YYYY-MM-DD` (UTC)
    pub day: String,
    pub change_count: u64,
}

/// Days with at least one stored change, newest first
pub fn list_change_days(conn: &Connection) -> Result<Vec<ChangeDay>> {
    let mut stmt = conn
        .prepare(
            "SELECT day, change_count FROM change_days WHERE change_count > 0 ORDER BY day DESC",
        )
        .map_err(from_rusqlite)?;
    let days = stmt
        .query_map([], |row| {
            Ok(ChangeDay {
                day: row.get(0)?,
                change_count: row.get::<_, i64>(1)? as u64,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(days)
}
