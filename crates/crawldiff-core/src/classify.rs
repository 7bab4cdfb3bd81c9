//! Change shape classification.
//!
//! [`classify`] maps the stored wire form of a diff node onto one of four
//! renderable shapes. It is total: payloads written before a format change,
//! or hand-edited rows, come back as [`ChangeShape::UnknownShape`] with a
//! reason instead of failing.

use crate::diff::ChangeType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ChangeShape {
    /// A single value added, removed or replaced
    ValueChange {
        change_type: ChangeType,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },
    /// Membership change of an embedded-key array
    ArrayChange {
        key: String,
        embedded_key: String,
        added: Vec<Value>,
        removed: Vec<Value>,
    },
    /// Independent changes grouped under one key, one level deep
    RecordChange {
        key: String,
        children: Vec<ChangeShape>,
    },
    UnknownShape { reason: String },
}

impl ChangeShape {
    fn unknown(reason: impl Into<String>) -> Self {
        ChangeShape::UnknownShape {
            reason: reason.into(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ChangeShape::UnknownShape { .. })
    }
}

/// Classify a raw diff payload.
pub fn classify(payload: &Value) -> ChangeShape {
    classify_node(payload, true)
}

fn classify_node(payload: &Value, allow_record: bool) -> ChangeShape {
    let Value::Object(node) = payload else {
        return ChangeShape::unknown(format!("payload is not an object: {}", type_name(payload)));
    };
    let change_type = match node.get("type").and_then(Value::as_str) {
        Some(raw) => match ChangeType::parse(raw) {
            Some(t) => t,
            None => return ChangeShape::unknown(format!("unrecognised change type `{}`", raw)),
        },
        None => return ChangeShape::unknown("missing change type"),
    };
    let Some(key) = node.get("key").and_then(Value::as_str) else {
        return ChangeShape::unknown("missing key");
    };

    match node.get("changes") {
        None => value_change(change_type, key, node),
        Some(Value::Array(children)) => match node.get("embeddedKey") {
            Some(Value::String(embedded_key)) => array_change(key, embedded_key, children),
            Some(other) => {
                ChangeShape::unknown(format!("embeddedKey is not a string: {}", type_name(other)))
            }
            None if !allow_record => {
                ChangeShape::unknown(format!("record `{}` nested deeper than one level", key))
            }
            None => record_change(key, children),
        },
        Some(other) => ChangeShape::unknown(format!("changes is not an array: {}", type_name(other))),
    }
}

fn value_change(change_type: ChangeType, key: &str, node: &Map<String, Value>) -> ChangeShape {
    let value = node.get("value").cloned();
    let (old_value, new_value) = match change_type {
        ChangeType::Add => (None, value),
        ChangeType::Remove => (value, None),
        ChangeType::Update => (node.get("oldValue").cloned(), value),
    };
    ChangeShape::ValueChange {
        change_type,
        key: key.to_string(),
        old_value,
        new_value,
    }
}

fn array_change(key: &str, embedded_key: &str, children: &[Value]) -> ChangeShape {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    for child in children {
        let is_leaf = child.get("changes").is_none();
        match (child.get("type").and_then(Value::as_str), is_leaf) {
            (Some("ADD"), true) => added.push(child.get("value").cloned().unwrap_or(Value::Null)),
            (Some("REMOVE"), true) => removed.push(child.get("value").cloned().unwrap_or(Value::Null)),
            _ => {
                return ChangeShape::unknown(format!(
                    "array `{}` carries a change other than ADD/REMOVE",
                    key
                ))
            }
        }
    }
    ChangeShape::ArrayChange {
        key: key.to_string(),
        embedded_key: embedded_key.to_string(),
        added,
        removed,
    }
}

fn record_change(key: &str, children: &[Value]) -> ChangeShape {
    if children.is_empty() {
        return ChangeShape::unknown(format!("record `{}` has no changes", key));
    }
    ChangeShape::RecordChange {
        key: key.to_string(),
        children: children.iter().map(|c| classify_node(c, false)).collect(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_change_update() {
        let shape = classify(&json!({"type": "UPDATE", "key": "context_length", "oldValue": 4096, "value": 8192}));
        assert_eq!(
            shape,
            ChangeShape::ValueChange {
                change_type: ChangeType::Update,
                key: "context_length".into(),
                old_value: Some(json!(4096)),
                new_value: Some(json!(8192)),
            }
        );
    }

    #[test]
    fn test_remove_puts_value_on_old_side() {
        let shape = classify(&json!({"type": "REMOVE", "key": "x", "value": 1}));
        assert!(matches!(
            shape,
            ChangeShape::ValueChange { old_value: Some(_), new_value: None, .. }
        ));
    }

    #[test]
    fn test_array_change() {
        let shape = classify(&json!({
            "type": "UPDATE", "key": "tags", "embeddedKey": "$value",
            "changes": [
                {"type": "REMOVE", "key": "a", "value": "a"},
                {"type": "ADD", "key": "c", "value": "c"}
            ]
        }));
        assert_eq!(
            shape,
            ChangeShape::ArrayChange {
                key: "tags".into(),
                embedded_key: "$value".into(),
                added: vec![json!("c")],
                removed: vec![json!("a")],
            }
        );
    }

    #[test]
    fn test_array_with_update_is_unknown() {
        let shape = classify(&json!({
            "type": "UPDATE", "key": "tags", "embeddedKey": "$value",
            "changes": [{"type": "UPDATE", "key": "a", "value": "b", "oldValue": "a"}]
        }));
        assert!(shape.is_unknown());
    }

    #[test]
    fn test_record_change_one_level() {
        let shape = classify(&json!({
            "type": "UPDATE", "key": "pricing",
            "changes": [
                {"type": "UPDATE", "key": "prompt", "oldValue": "1", "value": "2"},
                {"type": "UPDATE", "key": "deep", "changes": [{"type": "ADD", "key": "z", "value": 1}]}
            ]
        }));
        match shape {
            ChangeShape::RecordChange { key, children } => {
                assert_eq!(key, "pricing");
                assert!(matches!(children[0], ChangeShape::ValueChange { .. }));
                assert!(children[1].is_unknown());
            }
            other => panic!("expected record change, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payloads_are_unknown() {
        for payload in [
            json!(null),
            json!("UPDATE"),
            json!({"key": "x"}),
            json!({"type": "RENAME", "key": "x"}),
            json!({"type": "ADD"}),
            json!({"type": "UPDATE", "key": "x", "changes": {}}),
            json!({"type": "UPDATE", "key": "x", "changes": []}),
            json!({"type": "UPDATE", "key": "x", "embeddedKey": 3, "changes": []}),
        ] {
            assert!(classify(&payload).is_unknown(), "{} should be unknown", payload);
        }
    }
}
