//! Catalog entities and their availability lifecycle.

use crate::errors::CrawlDiffError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// The three materialized catalog tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Model,
    Endpoint,
    Provider,
}

impl EntityType {
    /// Processing order for a crawl
    pub const ALL: [EntityType; 3] = [EntityType::Provider, EntityType::Model, EntityType::Endpoint];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Model => "model",
            EntityType::Endpoint => "endpoint",
            EntityType::Provider => "provider",
        }
    }

    /// Attribute holding the natural key
    pub fn natural_key_field(&self) -> &'static str {
        match self {
            EntityType::Model | EntityType::Provider => "slug",
            EntityType::Endpoint => "uuid",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = CrawlDiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(EntityType::Model),
            "endpoint" => Ok(EntityType::Endpoint),
            "provider" => Ok(EntityType::Provider),
            other => Err(CrawlDiffError::UnknownEntityType {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a materialized entity.
///
/// `Active → Unavailable(since)` happens at most once per disappearance;
/// `since` is never overwritten while unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Active,
    Unavailable { since: DateTime<Utc> },
}

impl EntityState {
    /// Rebuild from the stored nullable column
    pub fn from_unavailable_at(unavailable_at: Option<DateTime<Utc>>) -> Self {
        match unavailable_at {
            Some(since) => EntityState::Unavailable { since },
            None => EntityState::Active,
        }
    }

    pub fn unavailable_at(&self) -> Option<DateTime<Utc>> {
        match self {
            EntityState::Active => None,
            EntityState::Unavailable { since } => Some(*since),
        }
    }

    /// Record the entity as no longer advertised. Returns `true` only when
    /// this call performed the transition.
    pub fn mark_unavailable(&mut self, at: DateTime<Utc>) -> bool {
        match self {
            EntityState::Active => {
                *self = EntityState::Unavailable { since: at };
                true
            }
            EntityState::Unavailable { .. } => false,
        }
    }

    /// Return to `Active`. Returns `true` only when this call cleared the marker.
    pub fn reactivate(&mut self) -> bool {
        match self {
            EntityState::Active => false,
            EntityState::Unavailable { .. } => {
                *self = EntityState::Active;
                true
            }
        }
    }
}

/// One entity as advertised by a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub entity_type: EntityType,
    pub key: String,
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// Validate a raw snapshot element and extract its natural key.
    ///
    /// The key must be a non-empty string or a number.
    pub fn from_value(entity_type: EntityType, index: usize, value: Value) -> Result<Self, CrawlDiffError> {
        let Value::Object(attributes) = value else {
            return Err(CrawlDiffError::EntityNotObject {
                entity_type: entity_type.to_string(),
                index,
            });
        };
        let field = entity_type.natural_key_field();
        let key = match attributes.get(field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(CrawlDiffError::MissingNaturalKey {
                    entity_type: entity_type.to_string(),
                    field: field.to_string(),
                })
            }
        };
        Ok(Self {
            entity_type,
            key,
            attributes,
        })
    }

    /// Attributes with volatile fields removed
    pub fn content(&self, volatile_fields: &[String]) -> Value {
        strip_volatile(&self.attributes, volatile_fields)
    }

    /// SHA-256 of the canonical content JSON
    pub fn content_digest(&self, volatile_fields: &[String]) -> String {
        content_digest(&self.content(volatile_fields))
    }

    /// Attribute rendered as an identity string (strings bare, numbers as text)
    pub fn attr_str(&self, field: &str) -> Option<String> {
        attr_str(&self.attributes, field)
    }
}

/// Copy of `attributes` without the named top-level fields
pub fn strip_volatile(attributes: &Map<String, Value>, volatile_fields: &[String]) -> Value {
    let mut content = attributes.clone();
    for field in volatile_fields {
        content.remove(field);
    }
    Value::Object(content)
}

/// SHA-256 hex digest of a value's JSON text.
///
/// `serde_json::Map` is key-ordered, so equal content always renders equal text.
pub fn content_digest(content: &Value) -> String {
    let canonical = serde_json::to_string(content).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Read a string-like attribute; nulls and structures are absent
pub fn attr_str(attributes: &Map<String, Value>, field: &str) -> Option<String> {
    match attributes.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
