//! API URL canonicalization.
//!
//! Backend URLs are handed around in several spellings (with or without the
//! scheme, `app` instead of `api`, a trailing slash). Credentials are keyed
//! by the canonical form, so every URL goes through [`api_url`] first.

use regex::Regex;
use std::sync::LazyLock;

/// Human-readable shape of a canonical URL, for messages.
pub const CANONICAL_FORM: &str = "https://[<node>.]<customer>.<region>.api.<cluster-host>";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(?P<node>[^./]+\.)?(?P<customer>[^./]+)\.(?P<region>[^./]+)\.ap[ip]\.(?P<host>[^/]+?)/?$",
    )
    .expect("valid API URL regex")
});

/// Map a URL onto its canonical `https://...api...` form.
///
/// Returns `None` when the URL does not have the expected shape.
///
/// ```
/// assert_eq!(
///     opclient::canonicalize_url("acme.us-west-2.app.example.io/").as_deref(),
///     Some("https://acme.us-west-2.api.example.io")
/// );
/// ```
#[must_use]
pub fn canonicalize_url(url: &str) -> Option<String> {
    let caps = URL_RE.captures(url.trim())?;
    let mut out = String::from("https://");
    caps.expand("${node}${customer}.${region}.api.${host}", &mut out);
    Some(out)
}

/// Canonicalize a URL, falling back to the input verbatim.
///
/// Custom deployments can live at arbitrary addresses, so a URL that does not
/// match only earns a warning.
#[must_use]
pub fn api_url(url: &str) -> String {
    match canonicalize_url(url) {
        Some(canonical) => canonical,
        None => {
            log::warn!("URL '{url}' is not of the form {CANONICAL_FORM}; using it as given");
            url.trim().trim_end_matches('/').to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_passthrough() {
        assert_eq!(
            canonicalize_url("https://acme.us-west-2.api.example.io").as_deref(),
            Some("https://acme.us-west-2.api.example.io")
        );
    }

    #[test]
    fn test_adds_scheme_and_fixes_app() {
        assert_eq!(
            canonicalize_url("acme.eu.app.shoreline-prod.io/").as_deref(),
            Some("https://acme.eu.api.shoreline-prod.io")
        );
        assert_eq!(
            canonicalize_url("http://acme.eu.api.shoreline-prod.io").as_deref(),
            Some("https://acme.eu.api.shoreline-prod.io")
        );
    }

    #[test]
    fn test_keeps_backend_node() {
        assert_eq!(
            canonicalize_url("https://n2.acme.us.api.example.io").as_deref(),
            Some("https://n2.acme.us.api.example.io")
        );
    }

    #[test]
    fn test_unmatched_urls() {
        assert_eq!(canonicalize_url("https://localhost:8080"), None);
        assert_eq!(canonicalize_url("https://acme.example.io/v1/path"), None);
        assert_eq!(api_url("https://localhost:8080/"), "https://localhost:8080");
    }
}
