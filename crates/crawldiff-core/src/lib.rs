//! crawldiff core - pure reconciliation and diff kernel
//!
//! This crate holds everything that does not touch storage:
//! - Recursive JSON tree diff with embedded-key arrays
//! - Entity parsing, content digests and the availability lifecycle
//! - Materialization and change-set reconciliation planning
//! - Change extraction between two crawls
//! - Change shape classification and feed ordering/pagination
//!
//! The store crate applies the plans produced here; the engine crate wires
//! both into the ingest and feed operations.

pub mod change;
pub mod classify;
pub mod config;
pub mod diff;
pub mod entity;
pub mod errors;
pub mod feed;
pub mod logging_facility;
pub mod materialize;
pub mod snapshot;

pub use crawldiff_core_types as types;

// Re-export commonly used types
pub use change::{ChangeExtractor, ChangeKind, ChangeRecord, ChangeSet, StoredChange};
pub use classify::{classify, ChangeShape};
pub use config::{FeedConfig, PipelineConfig};
pub use entity::{Entity, EntityState, EntityType};
pub use errors::{CrawlDiffError, ExError, ExErrorKind, Result};
pub use feed::{FeedGroup, FeedPage};
pub use materialize::{MaterializationPlan, MaterializeCounts};
pub use snapshot::Snapshot;
