//! Key-wise structural diff between two JSON values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Added,
    Removed,
    Changed,
}

/// One path that differs between a baseline and the current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Dotted path, with `[i]` for sequence indices. Empty for the root.
    pub path: String,
    pub kind: MutationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { &self.path };
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => write!(f, "{}: {} -> {}", path, before, after),
            (None, Some(after)) => write!(f, "{}: added {}", path, after),
            (Some(before), None) => write!(f, "{}: removed {}", path, before),
            (None, None) => write!(f, "{}: changed", path),
        }
    }
}

/// Every path where `after` differs from `before`, in key order.
pub fn diff(before: &Value, after: &Value) -> Vec<Mutation> {
    let mut mutations = Vec::new();
    diff_into(before, after, "", &mut mutations);
    mutations
}

fn diff_into(before: &Value, after: &Value, path: &str, out: &mut Vec<Mutation>) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            for key in keys {
                let child = key_path(path, key);
                match (old.get(key), new.get(key)) {
                    (Some(a), Some(b)) => diff_into(a, b, &child, out),
                    (Some(a), None) => out.push(Mutation {
                        path: child,
                        kind: MutationKind::Removed,
                        before: Some(a.clone()),
                        after: None,
                    }),
                    (None, Some(b)) => out.push(Mutation {
                        path: child,
                        kind: MutationKind::Added,
                        before: None,
                        after: Some(b.clone()),
                    }),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            for index in 0..old.len().max(new.len()) {
                let child = format!("{}[{}]", path, index);
                match (old.get(index), new.get(index)) {
                    (Some(a), Some(b)) => diff_into(a, b, &child, out),
                    (Some(a), None) => out.push(Mutation {
                        path: child,
                        kind: MutationKind::Removed,
                        before: Some(a.clone()),
                        after: None,
                    }),
                    (None, Some(b)) => out.push(Mutation {
                        path: child,
                        kind: MutationKind::Added,
                        before: None,
                        after: Some(b.clone()),
                    }),
                    (None, None) => {}
                }
            }
        }
        (a, b) if a != b => out.push(Mutation {
            path: path.to_string(),
            kind: MutationKind::Changed,
            before: Some(a.clone()),
            after: Some(b.clone()),
        }),
        _ => {}
    }
}

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}
