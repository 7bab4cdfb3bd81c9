//! Schema migrations
//!
//! SQL files under `migrations/` are embedded at compile time and applied in
//! order. Each applied migration is recorded in `schema_version` with the
//! SHA-256 of its SQL; a recorded checksum that no longer matches the
//! embedded file aborts startup.

mod embedded;
mod runner;

pub use embedded::{get_migrations, Migration};
pub use runner::{applied_migrations, apply_migrations};
