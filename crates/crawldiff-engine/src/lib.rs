//! crawldiff Engine - Orchestration layer
//!
//! Wires the pure planning kernel in `crawldiff-core` to the SQLite store:
//! snapshot ingest, change recomputation and the feed read path.

pub mod commands;

pub use commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
pub use commands::engine_query::{apply_engine_query, EngineQuery, EngineQueryResult};
pub use commands::ingest::{
    ingest_snapshot, recompute_changes, reconcile_change_sets, IngestReport, RecomputeReport,
};
