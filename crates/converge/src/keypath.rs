//! Dotted/indexed paths into JSON documents.
//!
//! A path like `condition_details.[0].metric_name` addresses key
//! `condition_details`, element 0, then key `metric_name`. The path `.` (or
//! the empty string) addresses the document root.

use serde_json::Value;
use std::fmt;

/// One step of a [`KeyPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

/// A parsed dotted/indexed path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

impl KeyPath {
    /// Parse a path. Never fails: a bracketed segment that is not a number is
    /// treated as a plain key.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .and_then(|idx| idx.parse().ok())
                    .map_or_else(|| Segment::Key(s.to_string()), Segment::Index)
            })
            .collect();
        Self { segments }
    }

    /// Whether this path addresses the document root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Look up the value at this path.
    #[must_use]
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(root, |cur, seg| match seg {
            Segment::Key(k) => cur.as_object()?.get(k),
            Segment::Index(i) => cur.as_array()?.get(*i),
        })
    }

    /// Mutable lookup of the value at this path.
    pub fn get_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.segments.iter().try_fold(root, |cur, seg| match seg {
            Segment::Key(k) => cur.as_object_mut()?.get_mut(k),
            Segment::Index(i) => cur.as_array_mut()?.get_mut(*i),
        })
    }

    /// Store a value at this path, creating intermediate objects for missing
    /// keys. Returns `false` if an intermediate value has the wrong shape or an
    /// index is out of range.
    pub fn set(&self, root: &mut Value, value: Value) -> bool {
        let Some((last, parents)) = self.segments.split_last() else {
            *root = value;
            return true;
        };

        let mut cur = root;
        for seg in parents {
            cur = match seg {
                Segment::Key(k) => {
                    if cur.is_null() {
                        *cur = Value::Object(serde_json::Map::new());
                    }
                    let Some(obj) = cur.as_object_mut() else {
                        return false;
                    };
                    obj.entry(k.clone())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()))
                }
                Segment::Index(i) => match cur.as_array_mut().and_then(|a| a.get_mut(*i)) {
                    Some(v) => v,
                    None => return false,
                },
            };
        }

        match last {
            Segment::Key(k) => {
                if cur.is_null() {
                    *cur = Value::Object(serde_json::Map::new());
                }
                match cur.as_object_mut() {
                    Some(obj) => {
                        obj.insert(k.clone(), value);
                        true
                    }
                    None => false,
                }
            }
            Segment::Index(i) => match cur.as_array_mut().and_then(|a| a.get_mut(*i)) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, ".");
        }
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => format!("[{i}]"),
            })
            .collect();
        write!(f, "{}", parts.join("."))
    }
}
