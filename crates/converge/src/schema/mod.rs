//! Attribute schema registry.
//!
//! Object types and their attributes are declared in a JSON configuration
//! document. The document is parsed and validated once; every structural
//! mistake is reported as [`Error::Schema`] at load time so reconciliation
//! never has to second-guess the schema.

use crate::codec;
use crate::error::{Error, Result};
use crate::keypath::KeyPath;
use crate::types::AttrValue;
use crate::version::VersionRecord;
use regex::Regex;
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The configuration document shipped with the crate.
pub const BUILTIN_DOCUMENT: &str = include_str!("object_types.json");

const DOCUMENT: &str = "<document>";

// ============================================================================
// Attribute types
// ============================================================================

/// Value type of an attribute. Decides both the command literal and how
/// backend JSON is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Quoted, escaped string
    String,
    /// Ordered list of strings
    StringList,
    /// Unordered list of strings
    StringSet,
    /// `true` / `false`
    Bool,
    /// Boolean sent to the backend as `1` / `0`
    IntBool,
    /// Decimal float
    Float,
    /// Signed integer
    Int,
    /// Positive integer
    Unsigned,
    /// Object name (alphanumeric/underscore)
    Label,
    /// Resource type name
    ResourceRef,
    /// Raw command-language expression, sent unquoted
    Command,
    /// Duration in seconds, read back with an `s` suffix
    TimeDuration,
    /// JSON document sent base64-encoded
    Base64Json,
}

impl AttributeType {
    /// Name used in the configuration document.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::StringList => "string_list",
            Self::StringSet => "string_set",
            Self::Bool => "bool",
            Self::IntBool => "int_bool",
            Self::Float => "float",
            Self::Int => "int",
            Self::Unsigned => "unsigned",
            Self::Label => "label",
            Self::ResourceRef => "resource_ref",
            Self::Command => "command",
            Self::TimeDuration => "time_duration",
            Self::Base64Json => "base64_json",
        }
    }

    /// The value an unset attribute of this type is equivalent to.
    #[must_use]
    pub fn zero_value(&self) -> AttrValue {
        match self {
            Self::StringList | Self::StringSet => AttrValue::List(Vec::new()),
            Self::Bool | Self::IntBool => AttrValue::Bool(false),
            Self::Float => AttrValue::Float(0.0),
            Self::Int | Self::Unsigned => AttrValue::Int(0),
            Self::String
            | Self::Label
            | Self::ResourceRef
            | Self::Command
            | Self::TimeDuration
            | Self::Base64Json => AttrValue::Str(String::new()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Container type a `base64_json` sub-field is coerced to after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    /// List of strings (a string-wrapped JSON array is unwrapped)
    StringList,
    /// Same as `StringList`
    StringSet,
    /// JSON object (a string-wrapped JSON object is unwrapped)
    Object,
}

// ============================================================================
// Raw document
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawObjectType {
    #[serde(default)]
    description: Option<String>,
    attributes: Vec<RawAttribute>,
    #[serde(default)]
    unpack: BTreeMap<String, String>,
    #[serde(default)]
    write_first: Vec<String>,
    #[serde(default)]
    write_last: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttribute {
    name: String,
    #[serde(rename = "type")]
    attr_type: AttributeType,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    computed: bool,
    #[serde(default)]
    force_new: bool,
    #[serde(default)]
    skip: bool,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    not_stored: bool,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    compound_in: Option<String>,
    #[serde(default)]
    compound_out: Option<String>,
    #[serde(default)]
    alias_out: Option<String>,
    #[serde(default)]
    proxy: Option<String>,
    #[serde(default)]
    min_version: Option<String>,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    deprecated_for: Option<String>,
    #[serde(default)]
    replaces: Option<String>,
    #[serde(default)]
    suppress_null_regex: Option<String>,
    #[serde(default)]
    match_null: Option<String>,
    #[serde(default)]
    cast: BTreeMap<String, CastType>,
    #[serde(default)]
    omit: BTreeMap<String, String>,
    #[serde(default)]
    omit_items: BTreeMap<String, String>,
    #[serde(default)]
    force_set: Vec<String>,
    #[serde(default)]
    skip_diff: Vec<String>,
    #[serde(default, rename = "refs")]
    _refs: Option<IgnoredAny>,
}

// ============================================================================
// Validated definitions
// ============================================================================

/// Boolean flags of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AttributeFlags {
    /// Must be declared
    pub required: bool,
    /// May be declared
    pub optional: bool,
    /// Computed by the engine or backend
    pub computed: bool,
    /// Changing it requires recreating the object
    pub force_new: bool,
    /// Never written as a field (e.g. `name`)
    pub skip: bool,
    /// Used in the create command
    pub primary: bool,
    /// Sub-field of a compound attribute; not declarable
    pub internal: bool,
    /// Local-only; never reported as cleared on read
    pub not_stored: bool,
}

/// Regex/template pair of a compound attribute.
#[derive(Debug, Clone)]
pub struct CompoundSpec {
    /// Decomposition regex with named groups
    pub regex: Regex,
    /// Recomposition template with `${name}` placeholders
    pub template: String,
}

/// Decode rules of a `base64_json` attribute.
#[derive(Debug, Clone, Default)]
pub struct JsonRules {
    /// Paths coerced to a container type after decoding
    pub cast: Vec<(KeyPath, CastType)>,
    /// Path to tag name of a backend-published dynamic key list
    pub omit: Vec<(KeyPath, String)>,
    /// Path to tag name of a backend-published key/value filter list
    pub omit_items: Vec<(KeyPath, String)>,
    /// Attributes rewritten after this one even when unchanged
    pub force_set: Vec<String>,
    /// Keys removed anywhere before equivalence comparison
    pub skip_diff: Vec<String>,
}

/// A validated attribute definition.
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    /// Attribute name, unique within its type
    pub name: String,
    /// Value type
    pub attr_type: AttributeType,
    /// Documentation
    pub description: Option<String>,
    /// Flags
    pub flags: AttributeFlags,
    /// Default value, type-matched
    pub default: Option<AttrValue>,
    /// Constant value for computed attributes
    pub value: Option<AttrValue>,
    /// Location in the describe response
    pub step_path: Option<KeyPath>,
    /// Present when this attribute is composed of internal sub-attributes
    pub compound: Option<CompoundSpec>,
    /// Field name used in write commands instead of `name`
    pub alias_out: Option<String>,
    /// Attributes whose values this attribute's handling computes
    pub proxy_for: Vec<String>,
    /// Minimum backend version supporting the attribute
    pub min_version: Option<VersionRecord>,
    /// Obsolete with no replacement
    pub deprecated: bool,
    /// Replacement attribute for a renamed field
    pub deprecated_for: Option<String>,
    /// Obsolete attribute this one replaces
    pub replaces: Option<String>,
    /// Remote values treated as equal to an empty desired value
    pub suppress_null: Option<Regex>,
    /// Value treated as equal to empty
    pub match_null: Option<String>,
    /// Decode rules (only `base64_json`)
    pub json: Option<JsonRules>,
}

impl AttributeDefinition {
    /// The declared default, or the type's zero value.
    #[must_use]
    pub fn default_or_zero(&self) -> AttrValue {
        self.default
            .clone()
            .unwrap_or_else(|| self.attr_type.zero_value())
    }

    /// Field name used when writing this attribute.
    #[must_use]
    pub fn write_name(&self) -> &str {
        self.alias_out.as_deref().unwrap_or(&self.name)
    }

    /// Whether this attribute is ever written as a field.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.flags.skip && !self.flags.internal && self.proxy_for.is_empty()
    }
}

/// A validated object type.
#[derive(Debug, Clone)]
pub struct ObjectTypeDefinition {
    /// Type name (e.g. `action`)
    pub name: String,
    /// Documentation
    pub description: Option<String>,
    attributes: Vec<AttributeDefinition>,
    primary: usize,
    /// Describe-response field holding string-encoded JSON, and where to
    /// store the decoded value
    pub unpack: Vec<(String, KeyPath)>,
    /// Attributes applied before all others
    pub write_first: Vec<String>,
    /// Attributes applied after the natural order
    pub write_last: Vec<String>,
}

impl ObjectTypeDefinition {
    /// Attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.attributes.iter()
    }

    /// Look up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The primary attribute used in the create command.
    #[must_use]
    pub fn primary(&self) -> &AttributeDefinition {
        &self.attributes[self.primary]
    }

    /// Whether reads need the describe command.
    #[must_use]
    pub fn needs_describe(&self) -> bool {
        !self.unpack.is_empty() || self.attributes.iter().any(|a| a.step_path.is_some())
    }

    /// Attributes in write order: `write_first`, the natural order, then
    /// `write_last`.
    #[must_use]
    pub fn write_order(&self) -> Vec<&AttributeDefinition> {
        let pinned: BTreeSet<&str> = self
            .write_first
            .iter()
            .chain(&self.write_last)
            .map(String::as_str)
            .collect();

        let first = self.write_first.iter().filter_map(|n| self.attribute(n));
        let middle = self
            .attributes
            .iter()
            .filter(|a| !pinned.contains(a.name.as_str()));
        let last = self.write_last.iter().filter_map(|n| self.attribute(n));
        first.chain(middle).chain(last).collect()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable mapping from type name to [`ObjectTypeDefinition`].
///
/// Safe for unsynchronized concurrent reads; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    types: BTreeMap<String, ObjectTypeDefinition>,
}

impl SchemaRegistry {
    /// Parse and validate a configuration document.
    pub fn load(document: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawObjectType> = serde_json::from_str(document)
            .map_err(|e| Error::schema(DOCUMENT, e.to_string()))?;
        if raw.is_empty() {
            return Err(Error::schema(DOCUMENT, "no object types declared"));
        }

        let mut types = BTreeMap::new();
        for (name, raw_type) in raw {
            let def = build_type(&name, raw_type)?;
            log::debug!(
                "Loaded object type '{}' with {} attributes",
                name,
                def.attributes.len()
            );
            types.insert(name, def);
        }
        Ok(Self { types })
    }

    /// Load the configuration document shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::load(BUILTIN_DOCUMENT)
    }

    /// Look up an object type.
    ///
    /// An unknown type is a programming error, not a transient condition.
    pub fn resolve(&self, type_name: &str) -> Result<&ObjectTypeDefinition> {
        self.types
            .get(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    /// Names of all object types.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

fn build_type(type_name: &str, raw: RawObjectType) -> Result<ObjectTypeDefinition> {
    let err = |msg: String| Error::schema(type_name, msg);

    let mut attributes = Vec::new();
    let mut seen = BTreeSet::new();
    for raw_attr in raw.attributes {
        // '#'-prefixed attributes are commented out
        if raw_attr.name.starts_with('#') {
            continue;
        }
        if !seen.insert(raw_attr.name.clone()) {
            return Err(err(format!("duplicate attribute '{}'", raw_attr.name)));
        }
        attributes.push(build_attribute(type_name, raw_attr)?);
    }

    if attributes.is_empty() {
        return Err(err("no attributes declared".to_string()));
    }
    if !seen.contains("name") {
        return Err(err("missing 'name' attribute".to_string()));
    }

    let primaries: Vec<usize> = attributes
        .iter()
        .enumerate()
        .filter(|(_, a)| a.flags.primary)
        .map(|(i, _)| i)
        .collect();
    let primary = match primaries.as_slice() {
        [one] => *one,
        [] => return Err(err("no primary attribute".to_string())),
        _ => return Err(err("more than one primary attribute".to_string())),
    };
    // the primary is rendered literally on create; only a root step reads it back unchanged
    if let Some(step) = &attributes[primary].step_path {
        if !step.is_root() {
            return Err(err(format!(
                "primary attribute '{}' cannot be read through step path '{step}'",
                attributes[primary].name
            )));
        }
    }

    let known = |name: &str| seen.contains(name);
    for attr in &attributes {
        let references = attr
            .deprecated_for
            .iter()
            .chain(&attr.replaces)
            .chain(&attr.proxy_for)
            .chain(attr.json.iter().flat_map(|j| &j.force_set));
        for target in references {
            if !known(target) {
                return Err(err(format!(
                    "attribute '{}' references unknown attribute '{}'",
                    attr.name, target
                )));
            }
        }

        if let Some(compound) = &attr.compound {
            for group in compound.regex.capture_names().flatten() {
                let internal = attributes
                    .iter()
                    .any(|a| a.name == group && a.flags.internal);
                if !internal {
                    return Err(err(format!(
                        "compound attribute '{}' captures '{}', which is not an internal attribute",
                        attr.name, group
                    )));
                }
            }
        }
    }

    for pinned in raw.write_first.iter().chain(&raw.write_last) {
        if !known(pinned) {
            return Err(err(format!("write order names unknown attribute '{pinned}'")));
        }
    }

    Ok(ObjectTypeDefinition {
        name: type_name.to_string(),
        description: raw.description,
        attributes,
        primary,
        unpack: raw
            .unpack
            .into_iter()
            .map(|(field, path)| (field, KeyPath::parse(&path)))
            .collect(),
        write_first: raw.write_first,
        write_last: raw.write_last,
    })
}

fn build_attribute(type_name: &str, raw: RawAttribute) -> Result<AttributeDefinition> {
    let err = |msg: String| Error::schema(type_name, format!("attribute '{}': {}", raw.name, msg));

    let default = raw
        .default
        .as_ref()
        .map(|v| codec::parse(raw.attr_type, v))
        .transpose()
        .map_err(|e| err(format!("default does not match type {}: {e}", raw.attr_type)))?;
    let value = raw
        .value
        .as_ref()
        .map(|v| codec::parse(raw.attr_type, v))
        .transpose()
        .map_err(|e| err(format!("value does not match type {}: {e}", raw.attr_type)))?;

    let compound = match (&raw.compound_in, &raw.compound_out) {
        (Some(pattern), Some(template)) => Some(CompoundSpec {
            regex: Regex::new(pattern).map_err(|e| err(format!("invalid compound_in: {e}")))?,
            template: template.clone(),
        }),
        (None, None) => None,
        _ => {
            return Err(err(
                "compound_in and compound_out must be declared together".to_string(),
            ));
        }
    };

    let suppress_null = raw
        .suppress_null_regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| err(format!("invalid suppress_null_regex: {e}")))?;

    let min_version = match raw.min_version.as_deref() {
        Some(v) => {
            let record = VersionRecord::parse(v);
            if !record.is_valid() {
                return Err(err(format!("min_version '{v}' is not major.minor.patch")));
            }
            Some(record)
        }
        None => None,
    };

    let has_json_rules = !raw.cast.is_empty()
        || !raw.omit.is_empty()
        || !raw.omit_items.is_empty()
        || !raw.force_set.is_empty()
        || !raw.skip_diff.is_empty();
    let json = if raw.attr_type == AttributeType::Base64Json {
        Some(JsonRules {
            cast: raw
                .cast
                .into_iter()
                .map(|(p, t)| (KeyPath::parse(&p), t))
                .collect(),
            omit: raw
                .omit
                .into_iter()
                .map(|(p, tag)| (KeyPath::parse(&p), tag))
                .collect(),
            omit_items: raw
                .omit_items
                .into_iter()
                .map(|(p, tag)| (KeyPath::parse(&p), tag))
                .collect(),
            force_set: raw.force_set,
            skip_diff: raw.skip_diff,
        })
    } else if has_json_rules {
        return Err(err(
            "cast/omit/omit_items/force_set/skip_diff require type base64_json".to_string(),
        ));
    } else {
        None
    };

    let proxy_for = raw
        .proxy
        .as_deref()
        .map(|p| {
            p.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(AttributeDefinition {
        flags: AttributeFlags {
            required: raw.required,
            optional: raw.optional,
            computed: raw.computed,
            force_new: raw.force_new,
            skip: raw.skip,
            primary: raw.primary,
            internal: raw.internal,
            not_stored: raw.not_stored,
        },
        name: raw.name,
        attr_type: raw.attr_type,
        description: raw.description,
        default,
        value,
        step_path: raw.step.as_deref().map(KeyPath::parse),
        compound,
        alias_out: raw.alias_out,
        proxy_for,
        min_version,
        deprecated: raw.deprecated,
        deprecated_for: raw.deprecated_for,
        replaces: raw.replaces,
        suppress_null,
        match_null: raw.match_null,
        json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_single(attributes: &str) -> Result<SchemaRegistry> {
        SchemaRegistry::load(&format!(r#"{{ "widget": {{ "attributes": {attributes} }} }}"#))
    }

    #[test]
    fn test_builtin_document_loads() {
        let registry = SchemaRegistry::builtin().unwrap();
        let names: Vec<&str> = registry.type_names().collect();
        for expected in ["action", "alarm", "bot", "file", "notebook", "resource"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = SchemaRegistry::builtin().unwrap();
        let err = registry.resolve("spaceship").unwrap_err();
        assert!(matches!(err, Error::UnknownType(_)));
    }

    #[test]
    fn test_primary_and_order() {
        let registry = SchemaRegistry::builtin().unwrap();
        let action = registry.resolve("action").unwrap();
        assert_eq!(action.primary().name, "command");
        assert_eq!(action.attributes().next().unwrap().name, "name");
        assert_eq!(action.attribute("timeout").unwrap().default, Some(AttrValue::Int(60000)));
    }

    #[test]
    fn test_commented_attributes_ignored() {
        let registry = SchemaRegistry::builtin().unwrap();
        let bot = registry.resolve("bot").unwrap();
        assert!(bot.attributes().all(|a| !a.name.starts_with('#')));
    }

    #[test]
    fn test_notebook_write_order() {
        let registry = SchemaRegistry::builtin().unwrap();
        let notebook = registry.resolve("notebook").unwrap();
        let order: Vec<&str> = notebook.write_order().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(order.first(), Some(&"data"));
        assert_eq!(&order[order.len() - 2..], &["allowed_entities", "approvers"]);
    }

    #[test]
    fn test_missing_primary_rejected() {
        let err = load_single(r#"[ { "name": "name", "type": "label" } ]"#).unwrap_err();
        assert!(err.to_string().contains("no primary"));
    }

    #[test]
    fn test_two_primaries_rejected() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label", "primary": true },
                 { "name": "value", "type": "command", "primary": true } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one primary"));
    }

    #[test]
    fn test_stepped_primary_rejected() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "command", "primary": true, "step": "body.value" } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("step path"));

        let registry = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "command", "primary": true, "step": "." } ]"#,
        )
        .unwrap();
        assert!(registry.resolve("widget").unwrap().primary().step_path.is_some());
    }

    #[test]
    fn test_empty_attributes_rejected() {
        assert!(load_single("[]").is_err());
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "command", "primary": true },
                 { "name": "value", "type": "string" } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_compound_group_must_be_internal() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "command", "type": "command", "primary": true,
                   "compound_in": "^(?P<left>.*)\\|(?P<right>.*)$",
                   "compound_out": "${left}|${right}" },
                 { "name": "left", "type": "command", "internal": true },
                 { "name": "right", "type": "command" } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'right'"));
    }

    #[test]
    fn test_default_must_match_type() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "command", "primary": true },
                 { "name": "limit", "type": "int", "default": "lots" } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn test_bad_min_version_rejected() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "command", "primary": true },
                 { "name": "extra", "type": "string", "min_version": "soon" } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_version"));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "command", "primary": true },
                 { "name": "old", "type": "string", "deprecated_for": "new" } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown attribute 'new'"));
    }

    #[test]
    fn test_json_rules_require_base64_json() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label" },
                 { "name": "value", "type": "string", "primary": true, "skip_diff": ["x"] } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("base64_json"));
    }

    #[test]
    fn test_malformed_document() {
        let err = SchemaRegistry::load("{ not json").unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Schema);
        assert!(SchemaRegistry::load("{}").is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = load_single(
            r#"[ { "name": "name", "type": "label", "primray": true } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("primray"));
    }
}
