//! Custom-property flattening.
//!
//! Strings become one-value sets, string arrays are kept, anything else is
//! logged and dropped. Names are normalized and colliding names merge.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

pub type PropertySets = BTreeMap<String, BTreeSet<String>>;

/// Lowercase, with every run of non-alphanumeric characters collapsed to `_`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_sep = false;
            normalized.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    normalized
}

/// Merge raw custom properties into `into`.
pub fn flatten_into(reference: &str, custom: &BTreeMap<String, Value>, into: &mut PropertySets) {
    for (name, value) in custom {
        let key = normalize_name(name);
        if key.is_empty() {
            warn!(reference, property = %name, "Dropping property with empty name");
            continue;
        }

        match value {
            Value::String(s) => {
                into.entry(key).or_default().insert(s.clone());
            }
            Value::Array(items) if items.iter().all(Value::is_string) => {
                let values = into.entry(key).or_default();
                values.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)));
            }
            other => {
                warn!(
                    reference,
                    property = %name,
                    kind = json_kind(other),
                    "Dropping property of unsupported type"
                );
            }
        }
    }
}

/// Merge name/value pairs (extractor metadata) into `into`.
pub fn merge_pairs(pairs: &[(String, String)], into: &mut PropertySets) {
    for (name, value) in pairs {
        let key = normalize_name(name);
        if !key.is_empty() {
            into.entry(key).or_default().insert(value.clone());
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "mixed array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Author"), "author");
        assert_eq!(normalize_name("  Due Date "), "due_date");
        assert_eq!(normalize_name("x--y::z"), "x_y_z");
        assert_eq!(normalize_name("__"), "");
    }

    #[test]
    fn test_flatten_policy() {
        let custom: BTreeMap<String, Value> = serde_json::from_value(json!({
            "Tags": ["b", "a"],
            "author": "ann",
            "pages": 12,
            "mixed": ["x", 1],
            "nested": {"k": "v"}
        }))
        .unwrap();

        let mut sets = PropertySets::new();
        flatten_into("/content/s/doc", &custom, &mut sets);

        assert_eq!(sets.len(), 2);
        assert_eq!(sets["tags"], BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(sets["author"], BTreeSet::from(["ann".to_string()]));
    }

    #[test]
    fn test_colliding_names_merge() {
        let custom: BTreeMap<String, Value> = serde_json::from_value(json!({
            "Due Date": "2024-01-01",
            "due_date": ["2024-02-01"],
        }))
        .unwrap();

        let mut sets = PropertySets::new();
        flatten_into("r", &custom, &mut sets);
        merge_pairs(&[("DUE-DATE".to_string(), "2024-03-01".to_string())], &mut sets);

        assert_eq!(sets.len(), 1);
        assert_eq!(sets["due_date"].len(), 3);
    }
}
