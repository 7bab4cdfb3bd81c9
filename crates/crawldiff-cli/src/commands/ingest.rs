//! Write commands: `ingest` and `recompute`.
//!
//! Both delegate to `apply_engine_command`, the canonical write path.

use super::{print_json, read_json, CliResult, GlobalArgs};
use clap::Args;
use crawldiff_core::Snapshot;
use crawldiff_engine::{apply_engine_command, EngineCommand};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Snapshot JSON document
    #[arg(long)]
    pub snapshot: PathBuf,
}

#[derive(Debug, Args)]
pub struct RecomputeArgs {
    /// Crawl whose changes against its predecessor are recomputed
    #[arg(long = "crawl")]
    pub crawl_id: String,
}

pub fn execute_ingest(global: &GlobalArgs, args: IngestArgs) -> CliResult {
    let config = global.load_config()?;
    let snapshot: Snapshot = read_json(&args.snapshot)?;
    let mut conn = global.open_store()?;

    let result = apply_engine_command(
        EngineCommand::Ingest {
            snapshot: Box::new(snapshot),
        },
        &mut conn,
        &config,
    )?;
    print_json(&result)
}

pub fn execute_recompute(global: &GlobalArgs, args: RecomputeArgs) -> CliResult {
    let config = global.load_config()?;
    let mut conn = global.open_store()?;

    let result = apply_engine_command(
        EngineCommand::Recompute {
            crawl_id: args.crawl_id,
        },
        &mut conn,
        &config,
    )?;
    print_json(&result)
}
