//! Command orchestration layer.
//!
//! Write-path commands (ingest, recompute) and read-path queries (feed,
//! day index) that coordinate the core kernel with the store.

pub mod engine_command;
pub mod engine_query;
pub mod feed;
pub mod ingest;
