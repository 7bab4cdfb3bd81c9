//! Snapshot documents handed over by the ingestion collaborator.

use crate::entity::{Entity, EntityType};
use crate::errors::CrawlDiffError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One full fetch of the upstream catalog.
///
/// `crawl_id` is opaque but must increase monotonically (byte-wise) between
/// crawls; adjacency and feed order both rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub crawl_id: String,
    pub crawled_at: DateTime<Utc>,
    #[serde(default)]
    pub models: Vec<Value>,
    #[serde(default)]
    pub endpoints: Vec<Value>,
    #[serde(default)]
    pub providers: Vec<Value>,
}

impl Snapshot {
    /// Raw collection for one entity type
    pub fn raw(&self, entity_type: EntityType) -> &[Value] {
        match entity_type {
            EntityType::Model => &self.models,
            EntityType::Endpoint => &self.endpoints,
            EntityType::Provider => &self.providers,
        }
    }

    /// Validated entities for one type, in snapshot order.
    ///
    /// # Errors
    ///
    /// - `EntityNotObject` / `MissingNaturalKey`: malformed element
    /// - `DuplicateEntityKey`: a natural key occurs twice
    pub fn entities(&self, entity_type: EntityType) -> Result<Vec<Entity>, CrawlDiffError> {
        let raw = self.raw(entity_type);
        let mut seen = HashSet::with_capacity(raw.len());
        let mut out = Vec::with_capacity(raw.len());
        for (index, value) in raw.iter().enumerate() {
            let entity = Entity::from_value(entity_type, index, value.clone())?;
            if !seen.insert(entity.key.clone()) {
                return Err(CrawlDiffError::DuplicateEntityKey {
                    entity_type: entity_type.to_string(),
                    key: entity.key,
                });
            }
            out.push(entity);
        }
        Ok(out)
    }
}
