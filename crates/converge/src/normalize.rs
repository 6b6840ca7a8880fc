//! JSON normalization for `base64_json` attributes.
//!
//! Documents returned by the backend carry dynamic, per-read fields that
//! would show up as spurious differences. [`normalize`] applies an
//! attribute's decode rules in a fixed order: casts, key omissions (root path
//! last), item omissions, then canonical serialization. [`prepare_for_compare`]
//! strips what the equivalence check ignores.
//!
//! Nested walks use an explicit stack, so deeply nested payloads cannot
//! exhaust the call stack.

use crate::codec;
use crate::error::Result;
use crate::schema::{CastType, JsonRules};
use serde_json::{Map, Value};

/// Top-level key older backends report inside the document.
const LEGACY_KEYS: &[&str] = &["enabled"];

/// Apply decode rules to a backend document and return its canonical form.
///
/// `tags` is the backend record publishing the dynamic key lists named by
/// the omission rules. `root_extra` names keys also removed by a root (`.`)
/// omission, e.g. the object's own attribute names.
pub fn normalize(
    rules: &JsonRules,
    mut document: Value,
    tags: &Value,
    root_extra: &[String],
) -> Result<String> {
    apply_casts(rules, &mut document);
    apply_omissions(rules, &mut document, tags, root_extra);
    apply_item_omissions(rules, &mut document, tags);
    Ok(serde_json::to_string(&document)?)
}

fn apply_casts(rules: &JsonRules, document: &mut Value) {
    for (path, cast) in &rules.cast {
        let Some(current) = path.get_mut(document) else {
            continue;
        };
        if current.is_null() {
            continue;
        }
        let replacement = match cast {
            CastType::StringList | CastType::StringSet => Value::Array(
                codec::json_list(current)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            CastType::Object => match current {
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(obj @ Value::Object(_)) => obj,
                    _ => continue,
                },
                _ => continue,
            },
        };
        log::debug!("Cast {path} to {cast:?}");
        *current = replacement;
    }
}

fn apply_omissions(rules: &JsonRules, document: &mut Value, tags: &Value, root_extra: &[String]) {
    // the root path goes last so it cannot erase omissions applied to children
    let (root, nested): (Vec<_>, Vec<_>) = rules.omit.iter().partition(|(path, _)| path.is_root());

    for (path, tag) in nested.into_iter().chain(root) {
        let mut list = match tags.get(tag).and_then(Value::as_array) {
            Some(list) => list.clone(),
            None => {
                log::debug!("Omit tag '{tag}' not published for {path}");
                Vec::new()
            }
        };
        if path.is_root() {
            list.extend(root_extra.iter().cloned().map(Value::String));
        }
        if list.is_empty() {
            continue;
        }
        let Some(target) = path.get_mut(document) else {
            continue;
        };
        log::debug!("Omitting {} entries at {path}", list.len());
        omit_entries(target, &list);
    }
}

/// Remove the string-named keys of `list` from an object, or from every
/// object element of an array. `{key, value}` filter entries drop the array
/// elements they match.
fn omit_entries(target: &mut Value, list: &[Value]) {
    let keys: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
    let filters: Vec<&Map<String, Value>> = list.iter().filter_map(Value::as_object).collect();

    match target {
        Value::Object(obj) => {
            for key in &keys {
                obj.remove(*key);
            }
        }
        Value::Array(items) => {
            if !filters.is_empty() {
                items.retain(|item| !matches_filters(item, &filters));
            }
            for item in items.iter_mut() {
                if let Value::Object(obj) = item {
                    for key in &keys {
                        obj.remove(*key);
                    }
                }
            }
        }
        _ => {}
    }
}

fn apply_item_omissions(rules: &JsonRules, document: &mut Value, tags: &Value) {
    for (path, tag) in &rules.omit_items {
        let Some(filters) = tags.get(tag).and_then(Value::as_array) else {
            continue;
        };
        let filters: Vec<&Map<String, Value>> =
            filters.iter().filter_map(Value::as_object).collect();
        if filters.is_empty() {
            continue;
        }
        if let Some(Value::Array(items)) = path.get_mut(document) {
            let before = items.len();
            items.retain(|item| !matches_filters(item, &filters));
            log::debug!("Dropped {} items at {path}", before - items.len());
        }
    }
}

/// Whether an element satisfies every `{key, value}` filter.
fn matches_filters(item: &Value, filters: &[&Map<String, Value>]) -> bool {
    let Some(obj) = item.as_object() else {
        return false;
    };
    filters.iter().all(|filter| {
        match (filter.get("key").and_then(Value::as_str), filter.get("value")) {
            (Some(key), Some(value)) => obj.get(key) == Some(value),
            _ => true,
        }
    })
}

/// Strip what equivalence comparison ignores: legacy top-level keys,
/// `skip_diff` keys at any depth, empty lists, and null `external_params`.
pub fn prepare_for_compare(document: &mut Value, skip_diff: &[String]) {
    if let Value::Object(root) = document {
        for key in LEGACY_KEYS {
            root.remove(*key);
        }
    }

    let mut stack: Vec<&mut Value> = vec![document];
    while let Some(node) = stack.pop() {
        match node {
            Value::Object(obj) => {
                obj.retain(|key, value| {
                    if skip_diff.iter().any(|s| s == key) {
                        return false;
                    }
                    match value {
                        Value::Array(items) => !items.is_empty(),
                        Value::Null => key != "external_params",
                        _ => true,
                    }
                });
                stack.extend(obj.values_mut());
            }
            Value::Array(items) => stack.extend(items.iter_mut()),
            _ => {}
        }
    }
}
