//! Reconciliation context
//!
//! Everything a reconciliation call needs from the outside world travels in
//! a [`ReconcileContext`] supplied by the caller: the command executor (and
//! with it the transport, credentials and retry policy) and the optional
//! file transfer collaborator. Nothing is process-global, so callers can talk
//! to several backends from one process.

use crate::executor::{CommandExecutor, RetryConfig};
use crate::files::FileTransfer;
use crate::transport::Transport;
use crate::version::VersionRecord;
use std::sync::Arc;

/// Command that reports the backend build.
pub const VERSION_COMMAND: &str = "backend_version";

/// Caller-supplied collaborators for reconciliation calls.
#[derive(Clone)]
pub struct ReconcileContext {
    executor: CommandExecutor,
    files: Option<Arc<dyn FileTransfer>>,
}

impl std::fmt::Debug for ReconcileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext")
            .field("executor", &self.executor)
            .field("files", &self.files.is_some())
            .finish()
    }
}

impl ReconcileContext {
    /// Create a context executing commands through `transport`.
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self {
            executor: CommandExecutor::new(transport, retry),
            files: None,
        }
    }

    /// Attach a file transfer collaborator, needed for `file` objects.
    #[must_use]
    pub fn with_file_transfer(mut self, files: Arc<dyn FileTransfer>) -> Self {
        self.files = Some(files);
        self
    }

    /// The command executor.
    #[must_use]
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// The file transfer collaborator, if configured.
    #[must_use]
    pub fn files(&self) -> Option<&dyn FileTransfer> {
        self.files.as_deref()
    }

    /// Ask the backend for its version.
    ///
    /// Never fails: an unreachable backend or an unreadable answer yields an
    /// invalid record, which version gating treats as "supported".
    #[must_use]
    pub fn backend_version(&self) -> VersionRecord {
        match self.executor.execute_json(VERSION_COMMAND) {
            Ok(response) => {
                let version = VersionRecord::from_backend_response(&response);
                log::debug!("Backend version: {version}");
                version
            }
            Err(e) => {
                log::warn!("Could not determine backend version: {e}");
                VersionRecord::invalid("unknown")
            }
        }
    }
}
