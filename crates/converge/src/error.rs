//! Error types for reconciliation.
//!
//! Errors are categorized so the command executor knows which failures are
//! worth retrying and callers know which ones indicate a configuration or
//! programming mistake rather than a transient backend condition.

use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of reconciliation errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed configuration document (fatal, at load time).
    Schema,
    /// Attribute explicitly set below the backend's supported version.
    VersionGate,
    /// Backend unreachable or the transport failed.
    Transport,
    /// Backend executed the command but reported a domain error.
    Semantic,
    /// Object or object type not found.
    NotFound,
    /// Malformed JSON or an undecodable composite field.
    Encoding,
    /// Local file could not be read or uploaded.
    FileTransfer,
}

impl ErrorCategory {
    /// Whether this error category is worth retrying.
    ///
    /// Some semantic errors are transient (e.g. concurrent modification), so
    /// they share the transport retry budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Semantic)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Schema => "Invalid object configuration",
            Self::VersionGate => "Backend version too old",
            Self::Transport => "Backend unavailable",
            Self::Semantic => "Backend rejected the command",
            Self::NotFound => "Object not found",
            Self::Encoding => "Malformed backend data",
            Self::FileTransfer => "File transfer failed",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Schema => "Fix the object configuration document",
            Self::VersionGate => "Upgrade the backend or remove the attribute from the declaration",
            Self::Transport => "Check the backend URL and credentials, then retry",
            Self::Semantic => "Check the attribute values against the backend error message",
            Self::NotFound => "Verify the object type and name",
            Self::Encoding => "The backend returned data in an unexpected shape",
            Self::FileTransfer => "Check that the local file exists and is readable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while loading schemas or reconciling objects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration document is malformed.
    #[error("schema error in {object_type}: {message}")]
    Schema {
        /// Object type being parsed (or `<document>` for top-level errors).
        object_type: String,
        /// What is wrong.
        message: String,
    },

    /// Lookup of an object type that the registry does not know.
    #[error("unknown object type: {0}")]
    UnknownType(String),

    /// Attribute requires a newer backend than the one connected.
    #[error("field '{object}.{attribute}' requires minimum version '{required}', but backend is '{backend}'")]
    VersionGate {
        /// Object name.
        object: String,
        /// Attribute name.
        attribute: String,
        /// Minimum version declared for the attribute.
        required: String,
        /// Version reported by the backend.
        backend: String,
    },

    /// The command could not be delivered or the backend failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message (innermost backend message when available).
        message: String,
    },

    /// The backend executed the command but reported an error.
    #[error("backend error: {message}")]
    Semantic {
        /// Innermost unescaped backend message.
        message: String,
    },

    /// No object of the given type and name exists.
    #[error("{object_type} '{name}' not found")]
    NotFound {
        /// Object type.
        object_type: String,
        /// Object name.
        name: String,
    },

    /// Backend data could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A local file operation failed.
    #[error("file transfer error: {0}")]
    FileTransfer(String),

    /// A write to a single attribute failed.
    #[error("failed to set {object_type} {object}.{attribute}: {source}")]
    Attribute {
        /// Object type.
        object_type: String,
        /// Object name.
        object: String,
        /// Attribute whose write failed.
        attribute: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a schema error.
    pub fn schema(object_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            object_type: object_type.into(),
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a semantic (backend-reported) error.
    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic {
            message: message.into(),
        }
    }

    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Schema { .. } => ErrorCategory::Schema,
            Error::UnknownType(_) => ErrorCategory::NotFound,
            Error::VersionGate { .. } => ErrorCategory::VersionGate,
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::Semantic { .. } => ErrorCategory::Semantic,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Encoding(_) => ErrorCategory::Encoding,
            Error::FileTransfer(_) => ErrorCategory::FileTransfer,
            Error::Attribute { source, .. } => source.category(),
        }
    }

    /// Whether this error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this is a "no such object" error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}
