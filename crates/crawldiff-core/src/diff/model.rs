//! Diff tree types.
//!
//! [`DiffNode`] is the tagged in-memory form. Its wire form (what gets stored
//! in `change_records.diff_json`) is the flat object
//! `{type, key, embeddedKey?, value?, oldValue?, changes?}` produced by
//! [`DiffNode::to_value`].

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Embedded key marker for arrays whose elements are their own identity.
pub const VALUE_IDENTITY: &str = "$value";

/// Kind of change carried by a diff node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Add,
    Update,
    Remove,
}

impl ChangeType {
    /// Wire name (`ADD`, `UPDATE`, `REMOVE`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "ADD",
            ChangeType::Update => "UPDATE",
            ChangeType::Remove => "REMOVE",
        }
    }

    /// Parse a wire name; anything else is `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADD" => Some(ChangeType::Add),
            "UPDATE" => Some(ChangeType::Update),
            "REMOVE" => Some(ChangeType::Remove),
            _ => None,
        }
    }
}

/// One node of a diff tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffNode {
    /// A single value added, removed or replaced.
    ///
    /// `ADD` carries `value`; `REMOVE` carries the removed value in `value`;
    /// `UPDATE` carries both `value` (new) and `old_value`.
    Leaf {
        change_type: ChangeType,
        key: String,
        value: Option<Value>,
        old_value: Option<Value>,
    },
    /// Membership change of an embedded-key array. Items are `ADD`/`REMOVE`
    /// leaves keyed by element identity.
    ArrayGroup {
        key: String,
        embedded_key: String,
        items: Vec<DiffNode>,
    },
    /// Independent changes of an object's keys.
    RecordGroup { key: String, children: Vec<DiffNode> },
}

impl DiffNode {
    pub fn add(key: impl Into<String>, value: Value) -> Self {
        DiffNode::Leaf {
            change_type: ChangeType::Add,
            key: key.into(),
            value: Some(value),
            old_value: None,
        }
    }

    pub fn remove(key: impl Into<String>, value: Value) -> Self {
        DiffNode::Leaf {
            change_type: ChangeType::Remove,
            key: key.into(),
            value: Some(value),
            old_value: None,
        }
    }

    pub fn update(key: impl Into<String>, old_value: Value, value: Value) -> Self {
        DiffNode::Leaf {
            change_type: ChangeType::Update,
            key: key.into(),
            value: Some(value),
            old_value: Some(old_value),
        }
    }

    /// Key this node is attached under
    pub fn key(&self) -> &str {
        match self {
            DiffNode::Leaf { key, .. }
            | DiffNode::ArrayGroup { key, .. }
            | DiffNode::RecordGroup { key, .. } => key,
        }
    }

    /// Change type on the wire; groups are always `UPDATE`
    pub fn change_type(&self) -> ChangeType {
        match self {
            DiffNode::Leaf { change_type, .. } => *change_type,
            DiffNode::ArrayGroup { .. } | DiffNode::RecordGroup { .. } => ChangeType::Update,
        }
    }

    /// Direct children (empty for leaves)
    pub fn children(&self) -> &[DiffNode] {
        match self {
            DiffNode::Leaf { .. } => &[],
            DiffNode::ArrayGroup { items, .. } => items,
            DiffNode::RecordGroup { children, .. } => children,
        }
    }

    /// Render the wire form
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for DiffNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.change_type().as_str())?;
        map.serialize_entry("key", self.key())?;
        match self {
            DiffNode::Leaf {
                value, old_value, ..
            } => {
                if let Some(value) = value {
                    map.serialize_entry("value", value)?;
                }
                if let Some(old_value) = old_value {
                    map.serialize_entry("oldValue", old_value)?;
                }
            }
            DiffNode::ArrayGroup {
                embedded_key,
                items,
                ..
            } => {
                map.serialize_entry("embeddedKey", embedded_key)?;
                map.serialize_entry("changes", items)?;
            }
            DiffNode::RecordGroup { children, .. } => {
                map.serialize_entry("changes", children)?;
            }
        }
        map.end()
    }
}

/// How elements of an embedded-key array are identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArrayIdentity {
    /// The element itself, string-coerced
    Value,
    /// The string-coerced value of the named field of each element
    Field(String),
}

impl ArrayIdentity {
    /// The `embeddedKey` recorded on array groups
    pub fn embedded_key(&self) -> &str {
        match self {
            ArrayIdentity::Value => VALUE_IDENTITY,
            ArrayIdentity::Field(name) => name,
        }
    }
}

impl From<String> for ArrayIdentity {
    fn from(s: String) -> Self {
        if s == VALUE_IDENTITY {
            ArrayIdentity::Value
        } else {
            ArrayIdentity::Field(s)
        }
    }
}

impl From<ArrayIdentity> for String {
    fn from(identity: ArrayIdentity) -> Self {
        identity.embedded_key().to_string()
    }
}

/// Options controlling [`super::diff`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOptions {
    embedded_keys: BTreeMap<String, ArrayIdentity>,
}

impl DiffOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat arrays under `field` (at any depth) as membership sets
    pub fn with_embedded_key(mut self, field: impl Into<String>, identity: ArrayIdentity) -> Self {
        self.embedded_keys.insert(field.into(), identity);
        self
    }

    /// Identity rule for a field, if it is an embedded-key array
    pub fn identity_for(&self, field: &str) -> Option<&ArrayIdentity> {
        self.embedded_keys.get(field)
    }
}

impl From<&BTreeMap<String, ArrayIdentity>> for DiffOptions {
    fn from(map: &BTreeMap<String, ArrayIdentity>) -> Self {
        Self {
            embedded_keys: map.clone(),
        }
    }
}
