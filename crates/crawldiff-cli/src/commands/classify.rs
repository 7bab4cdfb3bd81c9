//! `classify`: shape of a raw diff payload, or of every stored change of a crawl.

use super::feed::run_query;
use super::{print_json, read_json, CliResult, GlobalArgs};
use clap::Args;
use crawldiff_core::classify;
use crawldiff_engine::EngineQuery;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct ClassifyArgs {
    /// JSON file holding one diff node
    #[arg(long)]
    pub payload: Option<PathBuf>,

    /// Classify every stored change of this crawl instead
    #[arg(long = "crawl")]
    pub crawl_id: Option<String>,
}

pub fn execute(global: &GlobalArgs, args: ClassifyArgs) -> CliResult {
    match (args.payload, args.crawl_id) {
        (Some(path), _) => {
            let payload: Value = read_json(&path)?;
            print_json(&classify(&payload))
        }
        (None, Some(crawl_id)) => run_query(global, EngineQuery::ClassifyCrawl { crawl_id }),
        (None, None) => Err("either --payload or --crawl is required".into()),
    }
}
