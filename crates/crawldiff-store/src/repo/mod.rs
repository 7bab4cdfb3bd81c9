//! Repository layer
//!
//! Free functions over a borrowed `rusqlite::Connection`. Writers that touch
//! more than one row take `&mut Connection` and run in their own transaction.

pub mod archive;
pub mod changes;
pub mod crawls;
pub mod days;
pub mod entities;

pub use archive::ArchiveScan;
pub use changes::SqliteFeedSource;
pub use crawls::CrawlRow;
pub use days::ChangeDay;
pub use entities::EntityRow;
