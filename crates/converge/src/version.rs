//! Backend version records and comparison.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid version regex"));

/// Development builds report no version number and support everything.
const DEV_BUILD: (u64, u64, u64) = (9999, 9999, 9999);

/// A `major.minor.patch` version, possibly invalid.
///
/// Invalid records never satisfy a minimum-version comparison; callers treat
/// the comparison result as unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    /// Whether a version number was found
    pub valid: bool,
    /// Major version
    pub major: u64,
    /// Minor version
    pub minor: u64,
    /// Patch version
    pub patch: u64,
    /// The string the record was parsed from
    pub raw: String,
}

impl VersionRecord {
    /// Extract the first `major.minor.patch` found in `raw`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let numbers = VERSION_RE.captures(raw).and_then(|caps| {
            Some((
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            ))
        });
        match numbers {
            Some((major, minor, patch)) => Self {
                valid: true,
                major,
                minor,
                patch,
                raw: raw.to_string(),
            },
            None => Self::invalid(raw),
        }
    }

    /// An invalid record carrying the unparseable string.
    #[must_use]
    pub fn invalid(raw: &str) -> Self {
        Self {
            valid: false,
            major: 0,
            minor: 0,
            patch: 0,
            raw: raw.to_string(),
        }
    }

    /// Interpret a backend build tag.
    ///
    /// Tags starting with `stable` or `release` carry a version number; any
    /// other tag is a development build, treated as newer than everything.
    #[must_use]
    pub fn from_build_tag(tag: &str) -> Self {
        if tag.starts_with("stable") || tag.starts_with("release") {
            Self::parse(tag)
        } else {
            let (major, minor, patch) = DEV_BUILD;
            Self {
                valid: true,
                major,
                minor,
                patch,
                raw: tag.to_string(),
            }
        }
    }

    /// Decode the result of the `backend_version` command.
    ///
    /// The version lives in `get_backend_version`, a string holding a JSON
    /// object with a `tag` field.
    #[must_use]
    pub fn from_backend_response(response: &Value) -> Self {
        let Some(build) = response.get("get_backend_version").and_then(Value::as_str) else {
            return Self::invalid("unknown");
        };
        let tag = serde_json::from_str::<Value>(build)
            .ok()
            .and_then(|js| js.get("tag").and_then(Value::as_str).map(str::to_string));
        match tag {
            Some(tag) => Self::from_build_tag(&tag),
            None => Self::invalid(build),
        }
    }

    /// Whether a version number was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Compare against `want`. `None` means unknown: either record is invalid.
    #[must_use]
    pub fn compare(&self, want: &VersionRecord) -> Option<Ordering> {
        if !self.valid || !want.valid {
            return None;
        }
        Some(
            (self.major, self.minor, self.patch).cmp(&(want.major, want.minor, want.patch)),
        )
    }

    /// Whether this version is known to be older than `min`.
    ///
    /// An unknown comparison counts as supported.
    #[must_use]
    pub fn is_below(&self, min: &VersionRecord) -> bool {
        self.compare(min) == Some(Ordering::Less)
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{}.{}.{} ({})", self.major, self.minor, self.patch, self.raw)
        } else {
            write!(f, "unknown ({})", self.raw)
        }
    }
}
