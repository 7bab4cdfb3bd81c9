//! Feed read path.
//!
//! Read-only and repeatable: the same cursor against the same stored
//! records yields the same page.

#![allow(clippy::result_large_err)]

use crawldiff_core::feed::{paginate, FeedPage};
use crawldiff_core::types::RequestId;
use crawldiff_core::{log_op_end, log_op_error, log_op_start};
use crawldiff_core::FeedConfig;
use crawldiff_store::errors::Result;
use crawldiff_store::repo::days;
use crawldiff_store::{ChangeDay, SqliteFeedSource};
use rusqlite::Connection;

/// Fetch one feed page.
///
/// `page_size_goal` of `None` uses the configured default.
///
/// ## Errors
///
/// - `InvalidCursor`: the cursor was not produced by this feed
/// - `Persistence`: store failure
pub fn paginate_feed(
    conn: &Connection,
    cursor: Option<&str>,
    page_size_goal: Option<usize>,
    config: &FeedConfig,
) -> Result<FeedPage> {
    let request_id = RequestId::new();
    log_op_start!("paginate_feed", request_id = %request_id, has_cursor = cursor.is_some());
    let start = std::time::Instant::now();

    let goal = page_size_goal.unwrap_or(config.default_page_size_goal);
    let mut source = SqliteFeedSource::new(conn);
    let page = paginate(&mut source, cursor, goal, config).map_err(|e| {
        log_op_error!(
            "paginate_feed",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = %request_id
        );
        e.with_op("paginate_feed")
    })?;

    log_op_end!(
        "paginate_feed",
        duration_ms = start.elapsed().as_millis() as u64,
        request_id = %request_id,
        groups = page.items.len(),
        changes = page.change_count(),
        done = page.done
    );
    Ok(page)
}

/// Days with stored changes, newest first.
pub fn list_change_days(conn: &Connection) -> Result<Vec<ChangeDay>> {
    log_op_start!("list_change_days");
    let start = std::time::Instant::now();

    let days = days::list_change_days(conn).map_err(|e| {
        log_op_error!(
            "list_change_days",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    log_op_end!(
        "list_change_days",
        duration_ms = start.elapsed().as_millis() as u64,
        days = days.len()
    );
    Ok(days)
}
