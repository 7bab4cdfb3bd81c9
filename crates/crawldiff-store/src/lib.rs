//! crawldiff Store - SQLite persistence for the reconciliation pipeline
//!
//! Provides:
//! - SQLite schema with an embedded, checksummed migrations framework
//! - Crawl ledger and per-crawl entity archive
//! - Current-state entity tables with availability tracking
//! - Change records, the per-day index and the feed read path

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use errors::Result;
pub use repo::{ArchiveScan, ChangeDay, CrawlRow, EntityRow, SqliteFeedSource};
