//! Compound field transcoding.
//!
//! A compound attribute is one backend field (e.g. a bot's
//! `if <alarm> then <action> fi`) viewed as several internal attributes.
//! [`decompose`] splits the text with the attribute's named-group regex and
//! [`recompose`] fills the `${name}` placeholders of its template.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").expect("valid placeholder regex"));

/// Upper bound on substitution passes, so self-referencing values terminate.
const MAX_PASSES: usize = 16;

/// Split `text` into its named capture groups.
///
/// A group that did not participate in the match yields the empty string.
/// Text the regex does not match at all (no group captured anything) is an
/// [`Error::Encoding`], since silently returning empty parts would lose data.
pub fn decompose(regex: &Regex, text: &str) -> Result<BTreeMap<String, String>> {
    let not_matched = || {
        Error::encoding(format!(
            "compound value '{text}' does not match pattern '{}'",
            regex.as_str()
        ))
    };
    let caps = regex.captures(text).ok_or_else(not_matched)?;

    let mut parts = BTreeMap::new();
    let mut any = false;
    for name in regex.capture_names().flatten() {
        let value = caps.name(name).map_or("", |m| m.as_str());
        any |= caps.name(name).is_some();
        parts.insert(name.to_string(), value.to_string());
    }
    if !any && !parts.is_empty() {
        return Err(not_matched());
    }
    Ok(parts)
}

/// Substitute `${name}` placeholders until none remain.
///
/// Values may themselves contain placeholders. Unknown names become empty.
#[must_use]
pub fn recompose(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut text = template.to_string();
    for _ in 0..MAX_PASSES {
        if !PLACEHOLDER_RE.is_match(&text) {
            return text;
        }
        text = PLACEHOLDER_RE
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned();
    }
    log::warn!("Placeholders still unresolved after {MAX_PASSES} passes: {text}");
    text
}

/// Sub-fields whose value differs between two decompositions.
///
/// Keys present in `new` but equal in `old` are omitted.
#[must_use]
pub fn changed_parts<'a>(
    old: &BTreeMap<String, String>,
    new: &'a BTreeMap<String, String>,
) -> Vec<(&'a str, &'a str)> {
    new.iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
