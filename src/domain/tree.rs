//! Conversions between flat `path -> value` maps and nested tables.

use std::collections::BTreeMap;

use crate::domain::value::Value;

/// Sets a value in a nested table using a dot-notation path, creating
/// intermediate tables as needed. A non-table intermediate is replaced by
/// a fresh table, destructively.
pub fn set_nested(table: &mut BTreeMap<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = table;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }

        let child = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Table(BTreeMap::new()));
        if !matches!(child, Value::Table(_)) {
            *child = Value::Table(BTreeMap::new());
        }
        current = match child {
            Value::Table(t) => t,
            _ => unreachable!("child replaced with table above"),
        };
    }
}

/// Expands a nested table into flat `path -> leaf` pairs. Non-table
/// leaves, including arrays, are left untouched.
pub fn flatten(table: &BTreeMap<String, Value>, prefix: &str) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    flatten_into(table, prefix, &mut flat);
    flat
}

fn flatten_into(
    table: &BTreeMap<String, Value>,
    prefix: &str,
    flat: &mut BTreeMap<String, Value>,
) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::Table(nested) => flatten_into(nested, &path, flat),
            leaf => {
                flat.insert(path, leaf.clone());
            }
        }
    }
}

/// Dot-walks a value tree. Returns `None` when any intermediate segment
/// is absent or is not a table. An empty path (or a bare trailing dot)
/// returns the root itself.
pub fn navigate<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_suffix('.').unwrap_or(path);
    if path.is_empty() {
        return Some(root);
    }

    let mut current = root;
    for segment in path.split('.') {
        current = current.as_table()?.get(segment)?;
    }
    Some(current)
}
