//! Command executor - idempotent, retrying execution of single commands
//!
//! Every attempt carries a fresh idempotency token, so a retry is safe even
//! when an earlier attempt succeeded server-side but its response was lost.
//! Checked execution additionally inspects the result for an embedded
//! backend error and retries it like a transport failure.

mod retry;
mod token;

pub use retry::{LogCallback, RetryCallback, RetryConfig, with_retry};
pub use token::idempotency_token;

use crate::error::{Error, Result};
use crate::transport::Transport;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

static RESULT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(define|delete|update)_(\w+)$").expect("valid result key regex"));

static NESTED_MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"message: \\".*\\""#).expect("valid nested message regex"));

/// Length of the `message: \"` prefix matched by [`NESTED_MESSAGE_RE`].
const NESTED_PREFIX_LEN: usize = 11;

/// Executes commands through a [`Transport`] with bounded retry.
#[derive(Clone)]
pub struct CommandExecutor {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Create an executor over `transport`.
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    /// Retry policy in use.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Execute a command and return the raw result text.
    pub fn execute(&self, command: &str) -> Result<String> {
        self.run(command, Ok)
    }

    /// Execute a command and decode the result, without inspecting it for
    /// embedded backend errors.
    pub fn execute_json(&self, command: &str) -> Result<Value> {
        self.run(command, |raw| Ok(serde_json::from_str(&raw)?))
    }

    /// Execute a command and treat an embedded backend error as a failed
    /// attempt.
    pub fn execute_checked(&self, command: &str) -> Result<Value> {
        self.run(command, |raw| check_result(&raw))
    }

    fn run<T>(&self, command: &str, inspect: impl Fn(String) -> Result<T>) -> Result<T> {
        with_retry(&self.retry, Some(&LogCallback), |attempt| {
            let token = idempotency_token();
            log::debug!("Executing [{}] (attempt {}): {command}", token, attempt + 1);
            let raw = self
                .transport
                .execute(command, &token)
                .map_err(|e| match e {
                    Error::Transport { message } => Error::transport(inner_error_message(&message)),
                    other => other,
                })?;
            inspect(raw)
        })
    }
}

/// Decode a command result and surface an embedded backend error.
///
/// Looks at every top-level `{define|delete|update}_<type>` key. The error
/// text is `.error.message`, or the `.error.validation_errors[].message`
/// entries joined by newlines when the message is empty.
pub fn check_result(raw: &str) -> Result<Value> {
    let result: Value = serde_json::from_str(raw)?;

    if let Some(object) = result.as_object() {
        for (key, body) in object {
            if !RESULT_KEY_RE.is_match(key) {
                continue;
            }
            let Some(error) = body.get("error") else {
                continue;
            };
            let mut message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if message.is_empty() {
                message = error
                    .get("validation_errors")
                    .and_then(Value::as_array)
                    .map(|errors| {
                        errors
                            .iter()
                            .filter_map(|e| e.get("message").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
            }
            if !message.is_empty() {
                log::debug!("Backend reported an error under '{key}'");
                return Err(Error::semantic(inner_error_message(&message)));
            }
        }
    }
    Ok(result)
}

/// Unwrap a nested backend error to its innermost message.
///
/// Backend errors embed lower-level errors as `message: \"...\"`, escaping
/// once per level. Each level is unescaped (`\"` and `\\`) until no nested
/// message remains; literal `\n` sequences then become newlines.
#[must_use]
pub fn inner_error_message(message: &str) -> String {
    let mut current = message.to_string();
    loop {
        let Some(m) = NESTED_MESSAGE_RE.find(&current) else {
            return current.replace("\\n", "\n");
        };
        let inner = &current[m.start() + NESTED_PREFIX_LEN..m.end() - 2];
        current = inner.replace("\\\"", "\"").replace("\\\\", "\\");
    }
}
