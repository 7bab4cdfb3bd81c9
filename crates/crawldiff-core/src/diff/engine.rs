//! Diff computation.
//!
//! The entry point is [`diff`]. Everything here is pure.

use crate::diff::model::{ArrayIdentity, DiffNode, DiffOptions};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Key given to the root node of every diff.
pub const ROOT_KEY: &str = "$root";

/// String-coerce a JSON value for identity comparison.
///
/// Strings render bare, everything else as compact JSON, so `"1"` and `1`
/// share an identity.
pub fn coerce_identity(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compute the diff between `before` and `after`.
///
/// Returns `None` when the inputs are deeply equal (or differ only in the
/// order or content of embedded-key array elements with unchanged identity).
/// Two objects yield a [`DiffNode::RecordGroup`] keyed [`ROOT_KEY`]; any other
/// unequal pair yields an `UPDATE` leaf keyed [`ROOT_KEY`].
pub fn diff(before: &Value, after: &Value, options: &DiffOptions) -> Option<DiffNode> {
    if before == after {
        return None;
    }
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let children = diff_objects(a, b, options);
            (!children.is_empty()).then(|| DiffNode::RecordGroup {
                key: ROOT_KEY.to_string(),
                children,
            })
        }
        _ => Some(DiffNode::update(ROOT_KEY, before.clone(), after.clone())),
    }
}

/// Key-by-key comparison: `before` keys first, then `after`-only keys, each
/// in sorted key order.
fn diff_objects(a: &Map<String, Value>, b: &Map<String, Value>, options: &DiffOptions) -> Vec<DiffNode> {
    let mut out = Vec::new();
    for (key, va) in a {
        match b.get(key) {
            None => out.push(DiffNode::remove(key.clone(), va.clone())),
            Some(vb) if va != vb => out.extend(diff_field(key, va, vb, options)),
            Some(_) => {}
        }
    }
    for (key, vb) in b {
        if !a.contains_key(key) {
            out.push(DiffNode::add(key.clone(), vb.clone()));
        }
    }
    out
}

/// Diff one field present on both sides with unequal values.
fn diff_field(key: &str, va: &Value, vb: &Value, options: &DiffOptions) -> Option<DiffNode> {
    match (va, vb) {
        (Value::Array(a), Value::Array(b)) => match options.identity_for(key) {
            Some(identity) => diff_membership(key, identity, a, b),
            None => Some(DiffNode::update(key, va.clone(), vb.clone())),
        },
        (Value::Object(a), Value::Object(b)) => {
            let children = diff_objects(a, b, options);
            (!children.is_empty()).then(|| DiffNode::RecordGroup {
                key: key.to_string(),
                children,
            })
        }
        _ => Some(DiffNode::update(key, va.clone(), vb.clone())),
    }
}

fn element_identity(identity: &ArrayIdentity, element: &Value) -> String {
    match identity {
        ArrayIdentity::Value => coerce_identity(element),
        ArrayIdentity::Field(field) => match element.get(field) {
            Some(id) => coerce_identity(id),
            None => coerce_identity(element),
        },
    }
}

/// Membership diff: removals in `before` order, then additions in `after` order.
fn diff_membership(key: &str, identity: &ArrayIdentity, a: &[Value], b: &[Value]) -> Option<DiffNode> {
    let ids_a: BTreeSet<String> = a.iter().map(|e| element_identity(identity, e)).collect();
    let ids_b: BTreeSet<String> = b.iter().map(|e| element_identity(identity, e)).collect();

    let mut seen = BTreeSet::new();
    let mut items = Vec::new();
    for element in a {
        let id = element_identity(identity, element);
        if !ids_b.contains(&id) && seen.insert(id.clone()) {
            items.push(DiffNode::remove(id, element.clone()));
        }
    }
    seen.clear();
    for element in b {
        let id = element_identity(identity, element);
        if !ids_a.contains(&id) && seen.insert(id.clone()) {
            items.push(DiffNode::add(id, element.clone()));
        }
    }

    (!items.is_empty()).then(|| DiffNode::ArrayGroup {
        key: key.to_string(),
        embedded_key: identity.embedded_key().to_string(),
        items,
    })
}
