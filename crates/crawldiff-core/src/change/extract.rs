//! Change extraction between two adjacent crawls of one entity table.

use crate::change::{path_levels, ChangeKind, ChangeRecord};
use crate::diff::{diff, DiffNode, DiffOptions};
use crate::entity::{attr_str, Entity, EntityType};
use serde_json::Value;
use std::cmp::Ordering;
use std::iter::Peekable;

/// Computes the change records of one `(previous_crawl_id, crawl_id)` pair
/// for one entity type.
#[derive(Debug, Clone)]
pub struct ChangeExtractor {
    pub previous_crawl_id: String,
    pub crawl_id: String,
    pub entity_type: EntityType,
    pub volatile_fields: Vec<String>,
    pub diff_options: DiffOptions,
}

/// Identity fields attached to every record of one entity.
#[derive(Debug, Default)]
struct Identity {
    model_slug: Option<String>,
    provider_slug: Option<String>,
    provider_tag_slug: Option<String>,
    endpoint_uuid: Option<String>,
}

impl ChangeExtractor {
    pub fn new(
        previous_crawl_id: impl Into<String>,
        crawl_id: impl Into<String>,
        entity_type: EntityType,
        volatile_fields: Vec<String>,
        diff_options: DiffOptions,
    ) -> Self {
        Self {
            previous_crawl_id: previous_crawl_id.into(),
            crawl_id: crawl_id.into(),
            entity_type,
            volatile_fields,
            diff_options,
        }
    }

    fn identity(&self, entity: &Entity) -> Identity {
        let attrs = &entity.attributes;
        match self.entity_type {
            EntityType::Model => Identity {
                model_slug: Some(entity.key.clone()),
                ..Identity::default()
            },
            EntityType::Provider => Identity {
                provider_slug: Some(entity.key.clone()),
                ..Identity::default()
            },
            EntityType::Endpoint => Identity {
                model_slug: attr_str(attrs, "model_slug"),
                provider_slug: attr_str(attrs, "provider_slug"),
                provider_tag_slug: attr_str(attrs, "provider_tag_slug"),
                endpoint_uuid: Some(entity.key.clone()),
            },
        }
    }

    fn record(
        &self,
        identity: &Identity,
        change_kind: ChangeKind,
        path: String,
        before: Value,
        after: Value,
        node: &DiffNode,
    ) -> ChangeRecord {
        let (path_level_1, path_level_2) = path_levels(&path);
        ChangeRecord {
            crawl_id: self.crawl_id.clone(),
            previous_crawl_id: self.previous_crawl_id.clone(),
            entity_type: self.entity_type,
            change_kind,
            model_slug: identity.model_slug.clone(),
            provider_slug: identity.provider_slug.clone(),
            provider_tag_slug: identity.provider_tag_slug.clone(),
            endpoint_uuid: identity.endpoint_uuid.clone(),
            path,
            path_level_1,
            path_level_2,
            before,
            after,
            diff: node.to_value(),
        }
    }

    /// Records for one natural key seen on either side.
    ///
    /// Both sides absent yields nothing; so do equal contents.
    pub fn extract_pair(&self, before: Option<&Entity>, after: Option<&Entity>) -> Vec<ChangeRecord> {
        match (before, after) {
            (None, None) => Vec::new(),
            (None, Some(created)) => {
                let content = created.content(&self.volatile_fields);
                let node = DiffNode::add(created.key.clone(), content.clone());
                vec![self.record(
                    &self.identity(created),
                    ChangeKind::Create,
                    String::new(),
                    Value::Null,
                    content,
                    &node,
                )]
            }
            (Some(deleted), None) => {
                let content = deleted.content(&self.volatile_fields);
                let node = DiffNode::remove(deleted.key.clone(), content.clone());
                vec![self.record(
                    &self.identity(deleted),
                    ChangeKind::Delete,
                    String::new(),
                    content,
                    Value::Null,
                    &node,
                )]
            }
            (Some(old), Some(new)) => {
                let old_content = old.content(&self.volatile_fields);
                let new_content = new.content(&self.volatile_fields);
                let Some(root) = diff(&old_content, &new_content, &self.diff_options) else {
                    return Vec::new();
                };
                let identity = self.identity(new);
                root.children()
                    .iter()
                    .map(|child| {
                        let field = child.key().to_string();
                        let before = old_content.get(&field).cloned().unwrap_or(Value::Null);
                        let after = new_content.get(&field).cloned().unwrap_or(Value::Null);
                        self.record(&identity, ChangeKind::Update, field, before, after, child)
                    })
                    .collect()
            }
        }
    }

    /// Merge-join two key-ordered streams and extract every change.
    ///
    /// Both inputs must be sorted ascending by natural key (byte order), as
    /// the store's keyset scans return them. The first stream error aborts.
    pub fn extract<E>(
        &self,
        before: impl IntoIterator<Item = Result<Entity, E>>,
        after: impl IntoIterator<Item = Result<Entity, E>>,
    ) -> Result<Vec<ChangeRecord>, E> {
        let mut before = before.into_iter().peekable();
        let mut after = after.into_iter().peekable();
        let mut out = Vec::new();

        loop {
            let order = match (peek_key(&mut before)?, peek_key(&mut after)?) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(b), Some(a)) => b.cmp(&a),
            };
            match order {
                Ordering::Less => {
                    let old = take(&mut before)?;
                    out.extend(self.extract_pair(old.as_ref(), None));
                }
                Ordering::Greater => {
                    let new = take(&mut after)?;
                    out.extend(self.extract_pair(None, new.as_ref()));
                }
                Ordering::Equal => {
                    let old = take(&mut before)?;
                    let new = take(&mut after)?;
                    out.extend(self.extract_pair(old.as_ref(), new.as_ref()));
                }
            }
        }
        Ok(out)
    }

    /// In-memory convenience over [`Self::extract`]; sorts both sides first.
    pub fn extract_all(&self, mut before: Vec<Entity>, mut after: Vec<Entity>) -> Vec<ChangeRecord> {
        before.sort_by(|a, b| a.key.cmp(&b.key));
        after.sort_by(|a, b| a.key.cmp(&b.key));
        match self.extract::<std::convert::Infallible>(
            before.into_iter().map(Ok),
            after.into_iter().map(Ok),
        ) {
            Ok(records) => records,
            Err(never) => match never {},
        }
    }
}

fn peek_key<I, E>(iter: &mut Peekable<I>) -> Result<Option<String>, E>
where
    I: Iterator<Item = Result<Entity, E>>,
{
    match iter.peek() {
        None => Ok(None),
        Some(Ok(entity)) => Ok(Some(entity.key.clone())),
        Some(Err(_)) => match iter.next() {
            Some(Err(e)) => Err(e),
            _ => Ok(None),
        },
    }
}

fn take<I, E>(iter: &mut Peekable<I>) -> Result<Option<Entity>, E>
where
    I: Iterator<Item = Result<Entity, E>>,
{
    iter.next().transpose()
}
