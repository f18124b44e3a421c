//! Leaf field extraction for entity snapshots.
//!
//! # Invariants
//! - Only JSON objects are descended; arrays and scalars are leaves.
//! - Root bookkeeping fields (`id`, `createdAt`, `updatedAt`) are never
//!   returned. Nested fields with the same names are.
//! - Objects deeper than `MAX_FLATTEN_DEPTH` are returned whole as one leaf.

use crate::model::write_context::WriteMode;
use serde_json::Value;
use std::collections::HashSet;

/// Root-level fields owned by storage rather than by the caller.
pub const ROOT_BOOKKEEPING_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

pub const MAX_FLATTEN_DEPTH: usize = 32;

/// One `(dot.path, leaf)` pair borrowed from an entity snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLeaf<'a> {
    pub path: String,
    pub value: &'a Value,
}

/// Flattens `value` into dot-path leaves, in key order.
///
/// A non-object root has no named fields and yields nothing.
pub fn flatten_fields(value: &Value) -> Vec<FieldLeaf<'_>> {
    let mut leaves = Vec::new();
    if let Value::Object(map) = value {
        for (key, child) in map {
            if ROOT_BOOKKEEPING_FIELDS.contains(&key.as_str()) {
                continue;
            }
            collect_leaves(key.clone(), child, 1, &mut leaves);
        }
    }
    leaves
}

fn collect_leaves<'a>(path: String, value: &'a Value, depth: usize, out: &mut Vec<FieldLeaf<'a>>) {
    match value {
        Value::Object(map) if depth < MAX_FLATTEN_DEPTH => {
            for (key, child) in map {
                collect_leaves(format!("{path}.{key}"), child, depth + 1, out);
            }
        }
        _ => out.push(FieldLeaf { path, value }),
    }
}

/// Selects the entity leaves a write should record.
///
/// Create writes record every leaf. Update writes record only leaves whose
/// path the caller's payload addressed, so defaults and side effects the
/// entity carries are left out.
pub fn select_tracked_fields<'a>(
    entity: &'a Value,
    mode: WriteMode,
    payload: Option<&Value>,
) -> Vec<FieldLeaf<'a>> {
    let leaves = flatten_fields(entity);
    match mode {
        WriteMode::Create => leaves,
        WriteMode::Update => {
            let requested = payload
                .map(flatten_fields)
                .unwrap_or_default()
                .into_iter()
                .map(|leaf| leaf.path)
                .collect::<HashSet<_>>();
            leaves
                .into_iter()
                .filter(|leaf| requested.contains(&leaf.path))
                .collect()
        }
    }
}
