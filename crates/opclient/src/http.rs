//! Blocking HTTP transport for backend commands.
//!
//! Each command is POSTed as JSON to `<base>/v1/execute` with the bearer
//! token and the per-attempt idempotency key. The response body is the raw
//! JSON result the engine decodes.

use crate::error::{Error, Result};
use crate::url::api_url;
use converge::Transport;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Maximum accepted response size (large listings stay well below this).
const MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("opconverge/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    statement: &'a str,
}

/// Backend transport over HTTPS.
///
/// # Example
///
/// ```no_run
/// use converge::Transport;
/// use opclient::HttpTransport;
///
/// let transport = HttpTransport::new("acme.us-west-2.api.example.io", "secret");
/// let raw = transport.execute("backend_version", "00ff").unwrap();
/// println!("{raw}");
/// ```
pub struct HttpTransport {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Canonical API base URL.
    base_url: String,
    token: String,
}

impl HttpTransport {
    /// Create a transport for a backend URL, canonicalizing it first.
    #[must_use]
    pub fn new(url: &str, token: impl Into<String>) -> Self {
        Self::with_base_url(api_url(url), token)
    }

    /// Create a transport for an exact base URL (for testing or custom
    /// deployments).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        // Error bodies carry the backend message, so statuses are checked by hand.
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(config);
        Self {
            agent,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Get the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the command endpoint URL.
    fn execute_url(&self) -> String {
        format!("{}/v1/execute", self.base_url.trim_end_matches('/'))
    }

    fn post(&self, command: &str, idempotency_token: &str) -> Result<String> {
        let mut response = self
            .agent
            .post(&self.execute_url())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Idempotency-Key", idempotency_token)
            .header("User-Agent", USER_AGENT)
            .send_json(ExecuteRequest { statement: command })?;

        let status = response.status();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_string()
            .map_err(|e| Error::http(e.to_string(), Some(status.as_u16())))?;

        if status.is_success() {
            Ok(body)
        } else {
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                body
            };
            Err(Error::http(message, Some(status.as_u16())))
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn execute(&self, command: &str, idempotency_token: &str) -> converge::Result<String> {
        log::debug!("POST {} ({} bytes)", self.execute_url(), command.len());
        self.post(command, idempotency_token).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_canonicalizes() {
        let transport = HttpTransport::new("acme.eu.app.example.io/", "t");
        assert_eq!(transport.base_url(), "https://acme.eu.api.example.io");
        assert_eq!(transport.execute_url(), "https://acme.eu.api.example.io/v1/execute");
    }

    #[test]
    fn test_custom_base_url() {
        let transport = HttpTransport::with_base_url("http://127.0.0.1:9000/", "t");
        assert_eq!(transport.execute_url(), "http://127.0.0.1:9000/v1/execute");
    }

    #[test]
    fn test_debug_redacts_token() {
        let transport = HttpTransport::with_base_url("http://127.0.0.1:9000", "supersecret");
        let debug = format!("{transport:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("127.0.0.1"));
    }
}
