//! Pipeline configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! volatile_fields = ["updated_at"]
//! scan_batch_size = 500
//! reactivate_on_reappearance = false
//!
//! [embedded_keys]
//! supported_parameters = "$value"
//!
//! [feed]
//! max_groups = 10
//! default_page_size_goal = 50
//! ```

use crate::diff::{ArrayIdentity, DiffOptions};
use crate::errors::{CrawlDiffError, ExError, ExErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Feed Assembler bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum crawl groups read for one page
    pub max_groups: usize,
    /// Item goal used when the caller does not pass one
    pub default_page_size_goal: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_groups: 10,
            default_page_size_goal: 50,
        }
    }
}

/// Configuration shared by the write and read paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Top-level attributes ignored for equality and diffing
    pub volatile_fields: Vec<String>,
    /// Fields compared as membership sets, with their identity rule
    pub embedded_keys: BTreeMap<String, ArrayIdentity>,
    /// Rows per keyset batch when scanning tables
    pub scan_batch_size: usize,
    /// Clear `unavailable_at` when an entity is advertised again
    pub reactivate_on_reappearance: bool,
    pub feed: FeedConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let embedded_keys = [
            "supported_parameters",
            "supported_sampling_parameters",
            "input_modalities",
            "output_modalities",
        ]
        .into_iter()
        .map(|field| (field.to_string(), ArrayIdentity::Value))
        .collect();

        Self {
            volatile_fields: vec!["updated_at".to_string()],
            embedded_keys,
            scan_batch_size: 500,
            reactivate_on_reappearance: false,
            feed: FeedConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(s).map_err(|e| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_op("config_parse")
                .with_message(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("config_load")
                .with_message(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would stall scans or pagination
    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(CrawlDiffError::InvalidConfig {
                reason: "scan_batch_size must be greater than zero".to_string(),
            }
            .into());
        }
        if self.feed.max_groups == 0 {
            return Err(CrawlDiffError::InvalidConfig {
                reason: "feed.max_groups must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Diff options derived from `embedded_keys`
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions::from(&self.embedded_keys)
    }
}
