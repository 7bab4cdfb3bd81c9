//! crawldiff CLI
//!
//! Command-line interface over the ingest pipeline and the change feed.
//! Every subcommand prints one JSON document to stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use crawldiff_core::logging_facility::{self, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "crawldiff")]
#[command(about = "crawldiff - catalog snapshot reconciliation and change feed", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: commands::GlobalArgs,

    /// Logging profile: development, production or test (silent)
    #[arg(long, global = true, default_value = "production")]
    log: Profile,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest one snapshot document
    Ingest(commands::ingest::IngestArgs),
    /// Recompute the change records of an ingested crawl
    Recompute(commands::ingest::RecomputeArgs),
    /// Print one page of the change feed
    Feed(commands::feed::FeedArgs),
    /// List days that carry changes, newest first
    Days,
    /// List ingested crawls, newest first
    Crawls,
    /// Print one materialized entity
    Entity(commands::feed::EntityArgs),
    /// Classify a diff payload file or every change of a crawl
    Classify(commands::classify::ClassifyArgs),
}

fn main() {
    let cli = Cli::parse();
    logging_facility::init(cli.log);

    let result = match cli.command {
        Commands::Ingest(args) => commands::ingest::execute_ingest(&cli.global, args),
        Commands::Recompute(args) => commands::ingest::execute_recompute(&cli.global, args),
        Commands::Feed(args) => commands::feed::execute_feed(&cli.global, args),
        Commands::Days => commands::feed::execute_days(&cli.global),
        Commands::Crawls => commands::feed::execute_crawls(&cli.global),
        Commands::Entity(args) => commands::feed::execute_entity(&cli.global, args),
        Commands::Classify(args) => commands::classify::execute(&cli.global, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
