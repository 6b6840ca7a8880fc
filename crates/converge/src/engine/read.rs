//! Reading objects back from the backend.

use super::Session;
use crate::codec;
use crate::compound;
use crate::error::{Error, Result};
use crate::normalize;
use crate::schema::{AttributeDefinition, AttributeType, ObjectTypeDefinition};
use crate::types::{DesiredState, RemoteRecord};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key removed from normalized documents alongside the attribute names.
const ENABLED: &str = "enabled";

/// Backend responses an object's attributes are resolved from.
struct Sources {
    /// `attributes` of the matching list record
    listed: Value,
    /// Matching describe record (empty object when not described)
    described: Value,
}

pub(crate) fn list_command(def: &ObjectTypeDefinition, name: &str) -> String {
    format!("list {}s | name = \"{}\"", def.name, codec::escape(name))
}

pub(crate) fn describe_command(def: &ObjectTypeDefinition, name: &str) -> String {
    format!(
        "get_{t}_class( {t}_name = \"{}\" )",
        codec::escape(name),
        t = def.name
    )
}

/// Read and decode one object.
///
/// Attributes with no resolvable value fall back to their constant value,
/// then their default; anything left is reported as cleared.
pub(crate) fn read_object(
    session: &Session<'_>,
    def: &ObjectTypeDefinition,
    desired: &DesiredState,
) -> Result<RemoteRecord> {
    let name = desired.name();
    let sources = fetch(session, def, name)?;

    let mut record = RemoteRecord::default();
    for attr in def.attributes().filter(|a| !a.flags.internal) {
        if let Some(old) = &attr.replaces {
            if desired.is_declared(old) {
                log::debug!("Not reading '{}': replaced attribute '{old}' is declared", attr.name);
                continue;
            }
        }

        let mut raw = resolve(def, attr, &sources);
        if raw.is_none() && desired.is_declared(&attr.name) {
            if let Some(replacement) = attr.deprecated_for.as_deref().and_then(|r| def.attribute(r)) {
                log::debug!("Reading '{}' from replacement '{}'", attr.name, replacement.name);
                raw = resolve(def, replacement, &sources);
            }
        }

        match raw {
            Some(raw) => {
                let value = decode(def, attr, raw, &sources.described).map_err(|e| Error::Attribute {
                    object_type: def.name.clone(),
                    object: name.to_string(),
                    attribute: attr.name.clone(),
                    source: Box::new(e),
                })?;
                record.values.insert(attr.name.clone(), value);
            }
            None => {
                if let Some(fallback) = attr.value.as_ref().or(attr.default.as_ref()) {
                    record.values.insert(attr.name.clone(), fallback.clone());
                } else if !attr.flags.not_stored && attr.proxy_for.is_empty() {
                    record.cleared.insert(attr.name.clone());
                }
            }
        }
    }
    Ok(record)
}

fn fetch(session: &Session<'_>, def: &ObjectTypeDefinition, name: &str) -> Result<Sources> {
    let executor = session.ctx.executor();

    let listing = executor.execute_json(&list_command(def, name))?;
    let listed = find_named(
        listing.pointer("/list_type/symbol"),
        |record| record.pointer("/attributes/name"),
        name,
    )
    .and_then(|record| record.get("attributes").cloned())
    .ok_or_else(|| Error::NotFound {
        object_type: def.name.clone(),
        name: name.to_string(),
    })?;

    let mut described = Value::Object(Map::new());
    if def.needs_describe() {
        let response = executor.execute_json(&describe_command(def, name))?;
        let classes = response
            .get(format!("get_{}_class", def.name))
            .and_then(|c| c.get(format!("{}_classes", def.name)));
        match find_named(classes, |record| record.get("name"), name) {
            Some(record) => described = record.clone(),
            None => log::debug!("No describe record for {} '{name}'", def.name),
        }
        unpack(def, &mut described)?;
    }

    Ok(Sources { listed, described })
}

fn find_named<'v>(
    records: Option<&'v Value>,
    name_of: impl Fn(&'v Value) -> Option<&'v Value>,
    name: &str,
) -> Option<&'v Value> {
    records?
        .as_array()?
        .iter()
        .find(|record| name_of(*record).and_then(Value::as_str) == Some(name))
}

/// Decode string-encoded JSON fields of a describe record in place.
fn unpack(def: &ObjectTypeDefinition, described: &mut Value) -> Result<()> {
    for (field, target) in &def.unpack {
        let Some(text) = described.get(field).and_then(Value::as_str) else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        let decoded: Value = serde_json::from_str(text)?;
        target.set(described, decoded);
    }
    Ok(())
}

/// Locate an attribute's raw backend value. Null counts as absent.
fn resolve(def: &ObjectTypeDefinition, attr: &AttributeDefinition, sources: &Sources) -> Option<Value> {
    if let Some(spec) = &attr.compound {
        let mut parts = BTreeMap::new();
        let mut found = false;
        for group in spec.regex.capture_names().flatten() {
            let value = sources.listed.get(group).filter(|v| !v.is_null());
            found |= value.is_some();
            parts.insert(group.to_string(), value.map(codec::json_text).unwrap_or_default());
        }
        if found {
            return Some(Value::String(compound::recompose(&spec.template, &parts)));
        }
        log::debug!("{}: no sub-fields of compound '{}' reported", def.name, attr.name);
    }

    let raw = match &attr.step_path {
        Some(path) => path.get(&sources.described),
        None => sources.listed.get(&attr.name),
    };
    raw.filter(|v| !v.is_null()).cloned()
}

fn decode(
    def: &ObjectTypeDefinition,
    attr: &AttributeDefinition,
    raw: Value,
    described: &Value,
) -> Result<crate::types::AttrValue> {
    match (&attr.json, attr.attr_type) {
        (Some(rules), AttributeType::Base64Json) => {
            let canonical = codec::parse_json_document(&raw)?;
            if canonical.is_empty() {
                return Ok(canonical.into());
            }
            let document: Value = serde_json::from_str(&canonical)?;
            let root_extra: Vec<String> = def
                .attributes()
                .map(|a| a.name.clone())
                .chain(std::iter::once(ENABLED.to_string()))
                .collect();
            normalize::normalize(rules, document, described, &root_extra).map(Into::into)
        }
        _ => codec::parse(attr.attr_type, &raw),
    }
}
