//! Core types for declared and observed object state

use crate::codec;
use crate::error::{Error, Result};
use crate::schema::{AttributeDefinition, ObjectTypeDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A typed attribute value.
///
/// Every [`crate::AttributeType`] maps onto one of these variants; the
/// attribute's declared type decides how the value is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean (`bool`, `int_bool`)
    Bool(bool),
    /// Signed integer (`int`, `unsigned`)
    Int(i64),
    /// Floating point (`float`)
    Float(f64),
    /// Text (`string`, `label`, `resource_ref`, `command`, `time_duration`, `base64_json`)
    Str(String),
    /// List of strings (`string_list`, `string_set`)
    List(Vec<String>),
}

impl AttrValue {
    /// Borrow the text of a `Str` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a boolean.
    ///
    /// Integers are true when non-zero; strings accept `true`/`false`/`1`/`0`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            #[allow(clippy::float_cmp)]
            Self::Float(f) => Some(*f != 0.0),
            Self::Str(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                _ => None,
            },
            Self::List(_) => None,
        }
    }

    /// Plain-text form, used for compound fields and equivalence checks.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::List(items) => items.join(","),
        }
    }

    /// Whether this is an empty string or an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::List(items) => {
                let quoted: Vec<String> = items.iter().map(|i| format!("\"{i}\"")).collect();
                write!(f, "[{}]", quoted.join(", "))
            }
            other => write!(f, "{}", other.to_text()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for AttrValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

/// How an attribute's desired value came to be.
///
/// Distinguishes a value the caller wrote down from one inherited from the
/// schema default, so "explicitly set to the default" and "left unset" are
/// never conflated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence<'a> {
    /// The caller declared this value.
    Explicit(&'a AttrValue),
    /// The caller declared nothing; this is the schema default.
    Defaulted(&'a AttrValue),
    /// Neither declared nor defaulted.
    Absent,
}

impl<'a> Presence<'a> {
    /// The effective value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&'a AttrValue> {
        match self {
            Self::Explicit(v) | Self::Defaulted(v) => Some(v),
            Self::Absent => None,
        }
    }

    /// Whether the caller declared the value.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }
}

/// The caller's declared configuration for one object instance.
///
/// Only explicitly declared attributes are stored; defaults are resolved
/// against the schema on demand through [`DesiredState::presence`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredState {
    name: String,
    values: BTreeMap<String, AttrValue>,
}

impl DesiredState {
    /// Create a desired state for the named object.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), AttrValue::Str(name.clone()));
        Self { name, values }
    }

    /// Builder-style attribute declaration.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Declare an attribute value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicitly declared value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key)
    }

    /// Whether the caller declared the attribute.
    #[must_use]
    pub fn is_declared(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over declared attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.values.iter()
    }

    /// Resolve an attribute against its definition.
    #[must_use]
    pub fn presence<'a>(&'a self, attr: &'a AttributeDefinition) -> Presence<'a> {
        if let Some(value) = self.values.get(&attr.name) {
            Presence::Explicit(value)
        } else if let Some(default) = &attr.default {
            Presence::Defaulted(default)
        } else {
            Presence::Absent
        }
    }

    /// Build a desired state from a JSON object, typing each field by the
    /// object type's schema.
    ///
    /// Null fields are treated as undeclared. Unknown and internal attributes
    /// are rejected.
    pub fn from_json(def: &ObjectTypeDefinition, json: &serde_json::Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            Error::schema(&def.name, "declaration must be a JSON object")
        })?;
        let name = object
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::schema(&def.name, "declaration is missing a string 'name'"))?;

        let mut state = Self::new(name);
        for (key, raw) in object {
            if key == "name" || raw.is_null() {
                continue;
            }
            let attr = def
                .attribute(key)
                .filter(|a| !a.flags.internal)
                .ok_or_else(|| Error::schema(&def.name, format!("unknown attribute '{key}'")))?;
            let value = codec::parse(attr.attr_type, raw).map_err(|e| Error::Attribute {
                object_type: def.name.clone(),
                object: name.to_string(),
                attribute: key.clone(),
                source: Box::new(e),
            })?;
            state.set(key.clone(), value);
        }
        Ok(state)
    }
}

/// An object's state as decoded from a backend read.
///
/// Attributes with no resolvable value and no default are listed in
/// `cleared`, so their absence shows up in a diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteRecord {
    /// Decoded attribute values.
    pub values: BTreeMap<String, AttrValue>,
    /// Attributes the backend reported no value for.
    pub cleared: BTreeSet<String>,
}

impl RemoteRecord {
    /// Observed value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key)
    }

    /// Whether the attribute was read back as cleared.
    #[must_use]
    pub fn is_cleared(&self, key: &str) -> bool {
        self.cleared.contains(key)
    }

    /// JSON form: values as-is, cleared attributes as `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (key, value) in &self.values {
            out.insert(
                key.clone(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }
        for key in &self.cleared {
            out.insert(key.clone(), serde_json::Value::Null);
        }
        serde_json::Value::Object(out)
    }
}
