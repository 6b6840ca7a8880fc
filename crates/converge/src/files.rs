//! File transfer abstraction used by the `file` object type.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Moves local file content to the backend.
pub trait FileTransfer: Send + Sync {
    /// Upload a local file to a presigned destination URL.
    fn upload(&self, local: &Path, destination_url: &str) -> Result<()>;

    /// MD5 checksum (lowercase hex) and size in bytes of a local file.
    fn checksum_and_size(&self, local: &Path) -> Result<(String, u64)>;

    /// Encode a local file for inline transfer inside a write command.
    fn encode_inline(&self, local: &Path) -> Result<String>;
}

#[derive(Debug, Default)]
struct MockFiles {
    files: BTreeMap<PathBuf, (Vec<u8>, String)>,
    uploads: Vec<(PathBuf, String)>,
}

/// In-memory file transfer for tests.
///
/// Inline encoding is plain base64 of the registered contents. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct MockFileTransfer {
    state: Arc<Mutex<MockFiles>>,
}

impl MockFileTransfer {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local file with its contents and checksum.
    pub fn add_file(&self, path: impl Into<PathBuf>, contents: &[u8], checksum: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.into(), (contents.to_vec(), checksum.to_string()));
    }

    /// Uploads performed so far as `(local path, destination URL)`.
    #[must_use]
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    fn contents(&self, local: &Path) -> Result<(Vec<u8>, String)> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(local)
            .cloned()
            .ok_or_else(|| Error::FileTransfer(format!("{}: no such file", local.display())))
    }
}

impl FileTransfer for MockFileTransfer {
    fn upload(&self, local: &Path, destination_url: &str) -> Result<()> {
        self.contents(local)?;
        self.state
            .lock()
            .unwrap()
            .uploads
            .push((local.to_path_buf(), destination_url.to_string()));
        Ok(())
    }

    fn checksum_and_size(&self, local: &Path) -> Result<(String, u64)> {
        let (data, checksum) = self.contents(local)?;
        Ok((checksum, data.len() as u64))
    }

    fn encode_inline(&self, local: &Path) -> Result<String> {
        let (data, _) = self.contents(local)?;
        Ok(STANDARD.encode(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_file_transfer() {
        let mock = MockFileTransfer::new();
        mock.add_file("/tmp/a.txt", b"hello", "5d41402abc4b2a76b9719d911017c592");

        let (sum, size) = mock.checksum_and_size(Path::new("/tmp/a.txt")).unwrap();
        assert_eq!(sum, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(size, 5);
        assert_eq!(mock.encode_inline(Path::new("/tmp/a.txt")).unwrap(), "aGVsbG8=");

        mock.upload(Path::new("/tmp/a.txt"), "https://put").unwrap();
        assert_eq!(mock.uploads().len(), 1);
    }

    #[test]
    fn test_mock_missing_file() {
        let mock = MockFileTransfer::new();
        let err = mock.checksum_and_size(Path::new("/nope")).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::FileTransfer);
        assert!(mock.upload(Path::new("/nope"), "https://put").is_err());
    }
}
