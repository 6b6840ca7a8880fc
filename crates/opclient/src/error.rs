//! Error types for backend client operations.
//!
//! Errors are categorized so they map cleanly onto the reconciliation
//! engine's taxonomy: network trouble becomes a retryable transport error,
//! local file problems become file transfer errors.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// Credentials rejected by the backend.
    Auth,
    /// Local file could not be read.
    Io,
    /// Unexpected response or payload shape.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication failed",
            Self::Io => "Local file error",
            Self::Format => "Invalid response format",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the backend URL and your connection, then try again",
            Self::Auth => "Check the API token configured for this URL",
            Self::Io => "Check that the file exists and is readable",
            Self::Format => "The backend returned an unexpected response",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Upload to a presigned URL failed.
    #[error("upload of {path} failed: {message}")]
    UploadFailed {
        /// Local file being uploaded.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Compression of an inline payload failed.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Invalid response from the backend.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::HttpError {
                status: Some(401 | 403),
                ..
            } => ErrorCategory::Auth,
            Error::HttpError { .. } => ErrorCategory::Network,
            Error::UploadFailed { .. } => ErrorCategory::Network,
            Error::CompressionFailed(_) => ErrorCategory::Format,
            Error::Io { .. } => ErrorCategory::Io,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::HttpError {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Hand client failures to the engine: delivery problems are transport
/// errors, everything touching local files is a file transfer error.
impl From<Error> for converge::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::HttpError { .. } | Error::InvalidResponse(_) => Self::transport(err.to_string()),
            Error::UploadFailed { .. } | Error::CompressionFailed(_) | Error::Io { .. } => {
                Self::FileTransfer(err.to_string())
            }
        }
    }
}
