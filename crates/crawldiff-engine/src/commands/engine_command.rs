//! Engine-level write commands.

#![allow(clippy::result_large_err)]

use crate::commands::ingest::{ingest_snapshot, recompute_changes, IngestReport, RecomputeReport};
use crawldiff_core::{PipelineConfig, Snapshot};
use crawldiff_store::errors::Result;
use rusqlite::Connection;
use serde::Serialize;

/// Engine-level commands that write to the store.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Ingest one full snapshot (idempotent per crawl id).
    Ingest { snapshot: Box<Snapshot> },
    /// Recompute the change records of an ingested crawl.
    Recompute { crawl_id: String },
}

/// Result of applying an engine command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EngineCommandResult {
    Ingested(IngestReport),
    Recomputed(RecomputeReport),
}

/// Apply an engine command.
pub fn apply_engine_command(
    cmd: EngineCommand,
    conn: &mut Connection,
    config: &PipelineConfig,
) -> Result<EngineCommandResult> {
    match cmd {
        EngineCommand::Ingest { snapshot } => {
            ingest_snapshot(conn, &snapshot, config).map(EngineCommandResult::Ingested)
        }
        EngineCommand::Recompute { crawl_id } => {
            recompute_changes(conn, &crawl_id, config).map(EngineCommandResult::Recomputed)
        }
    }
}
