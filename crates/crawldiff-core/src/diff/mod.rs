//! Recursive tree diff over JSON values.
//!
//! Compares two `serde_json::Value`s and produces a tagged [`DiffNode`] tree
//! suitable for storage inside a change record and later classification.
//!
//! ## Entry point
//!
//! ```
//! use crawldiff_core::diff::{diff, ArrayIdentity, DiffOptions};
//! use serde_json::json;
//!
//! let options = DiffOptions::new().with_embedded_key("tags", ArrayIdentity::Value);
//! let node = diff(&json!({"tags": ["a", "b"]}), &json!({"tags": ["b", "c"]}), &options);
//! assert!(node.is_some());
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: keys shared with or only in `before` come first in
//!   sorted key order, then `after`-only keys in sorted key order
//!   (`serde_json::Map` iterates keys sorted); array groups list removals
//!   before additions.
//! - **Self-diff is empty**: deeply equal inputs yield `None`.
//! - **Null is a value**: a key holding `null` differs from an absent key.
//! - **Membership arrays**: fields named in [`DiffOptions`] compare by
//!   identity-set membership, never by position or element content.

pub mod engine;
pub mod model;

pub use engine::{coerce_identity, diff, ROOT_KEY};
pub use model::{ArrayIdentity, ChangeType, DiffNode, DiffOptions};
