//! Attribute diffs between desired and remote state
//!
//! [`equivalent`] is the single source of truth for "does this attribute
//! need a write". It applies the per-type suppression rules, so values that
//! differ only in formatting never produce a diff.

use crate::codec;
use crate::normalize;
use crate::schema::{AttributeDefinition, AttributeType, ObjectTypeDefinition};
use crate::types::{AttrValue, DesiredState, RemoteRecord};
use serde::Serialize;
use serde_json::Value;

/// A difference in one attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDiff {
    /// Attribute name
    pub attribute: String,
    /// Observed value (`None` when cleared or unreported)
    pub remote: Option<AttrValue>,
    /// Desired value (`None` when neither declared nor defaulted)
    pub desired: Option<AttrValue>,
}

impl AttributeDiff {
    /// The backend has no value yet.
    #[must_use]
    pub fn is_addition(&self) -> bool {
        self.remote.as_ref().is_none_or(AttrValue::is_empty)
            && self.desired.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// The desired state clears a value the backend has.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.desired.as_ref().is_none_or(AttrValue::is_empty)
            && self.remote.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Both sides hold different values.
    #[must_use]
    pub fn is_modification(&self) -> bool {
        !self.is_addition() && !self.is_removal()
    }
}

/// Compute the attributes whose desired value is not equivalent to the
/// remote one.
///
/// Internal, local-only and proxy attributes never diff. An attribute whose
/// obsolete predecessor (`replaces`) is declared is skipped as well, since it
/// was not read.
#[must_use]
pub fn compute_diffs(
    def: &ObjectTypeDefinition,
    desired: &DesiredState,
    remote: &RemoteRecord,
) -> Vec<AttributeDiff> {
    let mut diffs = Vec::new();
    for attr in def.attributes() {
        if attr.flags.internal || attr.flags.not_stored || !attr.proxy_for.is_empty() {
            continue;
        }
        if attr.replaces.as_deref().is_some_and(|old| desired.is_declared(old)) {
            continue;
        }
        let Some(value) = desired.presence(attr).value() else {
            continue;
        };
        let observed = remote.get(&attr.name);
        if !equivalent(attr, value, observed) {
            log::debug!("Attribute '{}' differs", attr.name);
            diffs.push(AttributeDiff {
                attribute: attr.name.clone(),
                remote: observed.cloned(),
                desired: Some(value.clone()),
            });
        }
    }
    diffs
}

/// Whether a desired value and an observed value mean the same thing.
#[must_use]
pub fn equivalent(attr: &AttributeDefinition, desired: &AttrValue, remote: Option<&AttrValue>) -> bool {
    let Some(remote) = remote else {
        return desired.is_empty();
    };

    if let Some(re) = &attr.suppress_null {
        if desired.is_empty() && re.is_match(&remote.to_text()) {
            return true;
        }
    }
    if let Some(null_value) = &attr.match_null {
        if (desired.is_empty() && remote.to_text() == *null_value)
            || (remote.is_empty() && desired.to_text() == *null_value)
        {
            return true;
        }
    }

    match attr.attr_type {
        AttributeType::Command => strip_whitespace(&desired.to_text()) == strip_whitespace(&remote.to_text()),
        AttributeType::TimeDuration => {
            match (codec::duration_secs(&desired.to_text()), codec::duration_secs(&remote.to_text())) {
                (Some(a), Some(b)) => a == b,
                _ => desired.to_text() == remote.to_text(),
            }
        }
        AttributeType::StringSet => sorted_quoted(desired) == sorted_quoted(remote),
        AttributeType::Base64Json => {
            let skip = attr.json.as_ref().map_or(&[][..], |rules| &rules.skip_diff[..]);
            match (comparable_document(desired, skip), comparable_document(remote, skip)) {
                (Some(a), Some(b)) => a == b,
                _ => desired.to_text() == remote.to_text(),
            }
        }
        AttributeType::Bool | AttributeType::IntBool => desired.as_bool() == remote.as_bool(),
        AttributeType::Float | AttributeType::Int | AttributeType::Unsigned => {
            codec::render(attr.attr_type, desired) == codec::render(attr.attr_type, remote)
        }
        AttributeType::String
        | AttributeType::StringList
        | AttributeType::Label
        | AttributeType::ResourceRef => desired == remote || desired.to_text() == remote.to_text(),
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn sorted_quoted(value: &AttrValue) -> Vec<String> {
    let items = match value {
        AttrValue::List(items) => items.clone(),
        other if other.is_empty() => Vec::new(),
        other => vec![other.to_text()],
    };
    let mut quoted: Vec<String> = items
        .iter()
        .map(|i| format!("\"{}\"", codec::escape(i)))
        .collect();
    quoted.sort();
    quoted
}

fn comparable_document(value: &AttrValue, skip_diff: &[String]) -> Option<Value> {
    let text = value.to_text();
    let mut document = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).ok()?
    };
    normalize::prepare_for_compare(&mut document, skip_diff);
    Some(document)
}

/// Summary of diff counts by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Attributes the backend lacks
    pub additions: usize,
    /// Attributes to clear
    pub removals: usize,
    /// Attributes to change
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    #[must_use]
    pub fn from_diffs(diffs: &[AttributeDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    #[must_use]
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
