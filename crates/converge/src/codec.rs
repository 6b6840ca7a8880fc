//! Field codec: typed values to command literals and back.
//!
//! [`render`] produces the exact literal the backend command language
//! expects. [`parse`] decodes a backend JSON value into the attribute's typed
//! form. [`parse_literal`] is the inverse of `render`.
//!
//! Floats render with six decimal places, so values with more precision do
//! not survive a render/parse round trip.

use crate::error::{Error, Result};
use crate::schema::{AttributeDefinition, AttributeType};
use crate::types::AttrValue;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Escape a string for a quoted literal: only `\` and `"` are escaped.
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quote(text: &str) -> String {
    format!("\"{}\"", escape(text))
}

/// Render a value as a command literal of the given type.
///
/// Total: a value of a mismatched variant is coerced through its text form.
#[must_use]
pub fn render(attr_type: AttributeType, value: &AttrValue) -> String {
    match attr_type {
        AttributeType::String | AttributeType::Label | AttributeType::ResourceRef => {
            quote(&value.to_text())
        }
        AttributeType::StringList | AttributeType::StringSet => {
            let items = match value {
                AttrValue::List(items) => items.clone(),
                other if other.is_empty() => Vec::new(),
                other => vec![other.to_text()],
            };
            let quoted: Vec<String> = items.iter().map(|i| quote(i)).collect();
            format!("[ {} ]", quoted.join(", "))
        }
        AttributeType::Bool => value.as_bool().unwrap_or(false).to_string(),
        AttributeType::IntBool => {
            if value.as_bool().unwrap_or(false) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        AttributeType::Float => format!("{:.6}", to_float(value).unwrap_or(0.0)),
        AttributeType::Int | AttributeType::Unsigned => to_int(value).unwrap_or(0).to_string(),
        AttributeType::Command => value.to_text(),
        AttributeType::TimeDuration => {
            let text = value.to_text();
            duration_secs(&text).map_or(text, |secs| secs.to_string())
        }
        AttributeType::Base64Json => quote(&STANDARD.encode(value.to_text())),
    }
}

/// Render an attribute's value, handling the optional-empty-command case:
/// an optional `command` attribute with an empty value renders as `""`.
#[must_use]
pub fn render_attribute(attr: &AttributeDefinition, value: &AttrValue) -> String {
    if attr.attr_type == AttributeType::Command && attr.flags.optional && value.is_empty() {
        return "\"\"".to_string();
    }
    render(attr.attr_type, value)
}

/// Decode a backend JSON value into the attribute's typed form.
pub fn parse(attr_type: AttributeType, value: &Value) -> Result<AttrValue> {
    match attr_type {
        AttributeType::String
        | AttributeType::Label
        | AttributeType::ResourceRef
        | AttributeType::Command => Ok(AttrValue::Str(json_text(value))),
        AttributeType::StringList | AttributeType::StringSet => Ok(AttrValue::List(json_list(value))),
        AttributeType::Bool | AttributeType::IntBool => json_bool(value)
            .map(AttrValue::Bool)
            .ok_or_else(|| Error::encoding(format!("expected a boolean, got {value}"))),
        AttributeType::Float => json_float(value)
            .map(AttrValue::Float)
            .ok_or_else(|| Error::encoding(format!("expected a number, got {value}"))),
        AttributeType::Int => json_int(value)
            .map(AttrValue::Int)
            .ok_or_else(|| Error::encoding(format!("expected an integer, got {value}"))),
        AttributeType::Unsigned => match json_int(value) {
            Some(n) if n >= 0 => Ok(AttrValue::Int(n)),
            _ => Err(Error::encoding(format!(
                "expected a non-negative integer, got {value}"
            ))),
        },
        AttributeType::TimeDuration => {
            let text = json_text(value);
            if text.ends_with(|c: char| c.is_ascii_digit()) {
                Ok(AttrValue::Str(format!("{text}s")))
            } else {
                Ok(AttrValue::Str(text))
            }
        }
        AttributeType::Base64Json => parse_json_document(value).map(AttrValue::Str),
    }
}

/// Parse a command literal produced by [`render`].
pub fn parse_literal(attr_type: AttributeType, literal: &str) -> Result<AttrValue> {
    let bad = || Error::encoding(format!("malformed {attr_type} literal: {literal}"));
    match attr_type {
        AttributeType::String | AttributeType::Label | AttributeType::ResourceRef => {
            unquote(literal).map(AttrValue::Str).ok_or_else(bad)
        }
        AttributeType::StringList | AttributeType::StringSet => {
            parse_list_literal(literal).map(AttrValue::List).ok_or_else(bad)
        }
        AttributeType::Bool => match literal {
            "true" => Ok(AttrValue::Bool(true)),
            "false" => Ok(AttrValue::Bool(false)),
            _ => Err(bad()),
        },
        AttributeType::IntBool => match literal {
            "1" => Ok(AttrValue::Bool(true)),
            "0" => Ok(AttrValue::Bool(false)),
            _ => Err(bad()),
        },
        AttributeType::Float => literal.parse().map(AttrValue::Float).map_err(|_| bad()),
        AttributeType::Int | AttributeType::Unsigned => {
            literal.parse().map(AttrValue::Int).map_err(|_| bad())
        }
        AttributeType::Command => {
            if literal == "\"\"" {
                Ok(AttrValue::Str(String::new()))
            } else {
                Ok(AttrValue::Str(literal.to_string()))
            }
        }
        AttributeType::TimeDuration => {
            if literal.chars().all(|c| c.is_ascii_digit()) && !literal.is_empty() {
                Ok(AttrValue::Str(format!("{literal}s")))
            } else {
                Err(bad())
            }
        }
        AttributeType::Base64Json => {
            let encoded = unquote(literal).ok_or_else(bad)?;
            parse(attr_type, &Value::String(encoded))
        }
    }
}

/// Convert a duration like `30s`, `5m`, `2h`, `1d` or `45` into seconds.
#[must_use]
pub fn duration_secs(text: &str) -> Option<i64> {
    let text = text.trim();
    let (digits, mult) = match text.chars().last()? {
        's' => (&text[..text.len() - 1], 1),
        'm' => (&text[..text.len() - 1], 60),
        'h' => (&text[..text.len() - 1], 60 * 60),
        'd' => (&text[..text.len() - 1], 60 * 60 * 24),
        _ => (text, 1),
    };
    digits.parse::<i64>().ok()?.checked_mul(mult)
}

/// Decode a JSON document given either inline or as base64 text, and return
/// its canonical serialization. Empty input stays empty.
pub fn parse_json_document(value: &Value) -> Result<String> {
    let document = match value {
        Value::Null => return Ok(String::new()),
        Value::String(s) if s.trim().is_empty() => return Ok(String::new()),
        Value::String(s) => decode_json_text(s)?,
        other => other.clone(),
    };
    Ok(serde_json::to_string(&document)?)
}

fn decode_json_text(text: &str) -> Result<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| Error::encoding(format!("invalid base64 JSON document: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Text form of a JSON value (strings unquoted, null empty).
#[must_use]
pub fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a JSON value into a list of strings.
///
/// A string holding a JSON array is unwrapped; any other non-empty scalar
/// becomes a single-element list.
#[must_use]
pub fn json_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(json_text).collect(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items.iter().map(json_text).collect(),
            _ => vec![s.clone()],
        },
        other => vec![json_text(other)],
    }
}

fn json_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => AttrValue::Str(s.clone()).as_bool(),
        Value::Null => Some(false),
        _ => None,
    }
}

fn json_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_int(value: &AttrValue) -> Option<i64> {
    match value {
        AttrValue::Int(n) => Some(*n),
        AttrValue::Float(f) => Some(*f as i64),
        AttrValue::Bool(b) => Some(i64::from(*b)),
        AttrValue::Str(s) => s.trim().parse().ok(),
        AttrValue::List(_) => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_float(value: &AttrValue) -> Option<f64> {
    match value {
        AttrValue::Float(f) => Some(*f),
        AttrValue::Int(n) => Some(*n as f64),
        AttrValue::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strip the surrounding quotes of a rendered string and undo escaping.
fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Parse `[ "a", "b" ]` back into its items.
fn parse_list_literal(literal: &str) -> Option<Vec<String>> {
    let inner = literal.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.next() {
            None => return Some(items),
            Some('"') => {
                let mut item = String::new();
                loop {
                    match chars.next()? {
                        '\\' => item.push(chars.next()?),
                        '"' => break,
                        c => item.push(c),
                    }
                }
                items.push(item);
            }
            Some(_) => return None,
        }
    }
}
