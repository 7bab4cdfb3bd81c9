//! Subcommand implementations and the plumbing they share.

pub mod classify;
pub mod feed;
pub mod ingest;

use clap::Args;
use crawldiff_core::PipelineConfig;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// SQLite database file; created and migrated on first use
    #[arg(long, global = true, default_value = ".crawldiff/crawldiff.db")]
    pub db: PathBuf,

    /// TOML pipeline configuration; defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn open_store(&self) -> Result<Connection, Box<dyn std::error::Error>> {
        if let Some(parent) = self.db.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(crawldiff_store::db::open_and_migrate(&self.db)?)
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in {}: {}", path.display(), e).into())
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
