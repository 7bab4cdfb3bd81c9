//! Read commands over the store.

use super::{print_json, CliResult, GlobalArgs};
use clap::Args;
use crawldiff_core::EntityType;
use crawldiff_engine::{apply_engine_query, EngineQuery};

#[derive(Debug, Args)]
pub struct FeedArgs {
    /// Opaque cursor from a previous page's `next_cursor`
    #[arg(long)]
    pub cursor: Option<String>,

    /// Stop once at least this many changes were emitted
    #[arg(long)]
    pub goal: Option<usize>,
}

#[derive(Debug, Args)]
pub struct EntityArgs {
    /// model, endpoint or provider
    #[arg(long = "type")]
    pub entity_type: EntityType,

    /// Natural key (slug or uuid)
    #[arg(long)]
    pub key: String,
}

pub fn execute_feed(global: &GlobalArgs, args: FeedArgs) -> CliResult {
    run_query(
        global,
        EngineQuery::Feed {
            cursor: args.cursor,
            page_size_goal: args.goal,
        },
    )
}

pub fn execute_days(global: &GlobalArgs) -> CliResult {
    run_query(global, EngineQuery::ChangeDays)
}

pub fn execute_crawls(global: &GlobalArgs) -> CliResult {
    run_query(global, EngineQuery::Crawls)
}

pub fn execute_entity(global: &GlobalArgs, args: EntityArgs) -> CliResult {
    run_query(
        global,
        EngineQuery::EntityGet {
            entity_type: args.entity_type,
            entity_key: args.key,
        },
    )
}

pub(super) fn run_query(global: &GlobalArgs, query: EngineQuery) -> CliResult {
    let config = global.load_config()?;
    let conn = global.open_store()?;
    let result = apply_engine_query(query, &conn, &config)?;
    print_json(&result)
}
