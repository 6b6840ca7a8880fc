//! Local file handling for `file` objects.
//!
//! Large payloads go to the backend's object store through a presigned PUT
//! URL; small ones travel inline inside the write command as base64 of the
//! zstd-compressed bytes.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use converge::FileTransfer;
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// zstd level used for inline payloads (the library default).
const COMPRESSION_LEVEL: i32 = 0;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// File transfer over HTTP.
#[derive(Debug)]
pub struct HttpFileTransfer {
    agent: ureq::Agent,
}

impl HttpFileTransfer {
    /// Create a file transfer with its own HTTP agent.
    #[must_use]
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(UPLOAD_TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn put(&self, local: &Path, destination_url: &str) -> Result<()> {
        let data = fs::read(local).map_err(|e| Error::io(local, e))?;
        log::debug!("Uploading {} ({} bytes)", local.display(), data.len());

        let response = self
            .agent
            .put(destination_url)
            .header("Content-Type", "application/octet-stream")
            .send(&data[..])
            .map_err(|e| Error::UploadFailed {
                path: local.to_path_buf(),
                message: e.to_string(),
            })?;
        log::debug!("Uploaded {}: {}", local.display(), response.status());
        Ok(())
    }
}

impl Default for HttpFileTransfer {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming md5 (lowercase hex) and size of a file.
pub fn checksum_and_size(local: &Path) -> Result<(String, u64)> {
    let mut file = File::open(local).map_err(|e| Error::io(local, e))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(local, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

/// Base64 of the zstd-compressed file contents.
pub fn encode_inline(local: &Path) -> Result<String> {
    let raw = fs::read(local).map_err(|e| Error::io(local, e))?;
    let compressed = zstd::encode_all(&raw[..], COMPRESSION_LEVEL)
        .map_err(|e| Error::CompressionFailed(e.to_string()))?;
    Ok(STANDARD.encode(compressed))
}

impl FileTransfer for HttpFileTransfer {
    fn upload(&self, local: &Path, destination_url: &str) -> converge::Result<()> {
        self.put(local, destination_url).map_err(Into::into)
    }

    fn checksum_and_size(&self, local: &Path) -> converge::Result<(String, u64)> {
        checksum_and_size(local).map_err(Into::into)
    }

    fn encode_inline(&self, local: &Path) -> converge::Result<String> {
        encode_inline(local).map_err(Into::into)
    }
}
