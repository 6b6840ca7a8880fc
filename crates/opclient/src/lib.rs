//! # opclient
//!
//! Concrete backend collaborators for the [`converge`] engine.
//!
//! This crate provides:
//! - [`HttpTransport`], a blocking HTTPS [`converge::Transport`]
//! - [`HttpFileTransfer`], presigned uploads and inline file payloads
//! - API URL canonicalization ([`canonicalize_url`], [`api_url`])
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use converge::{ReconcileContext, RetryConfig};
//! use opclient::{HttpFileTransfer, HttpTransport};
//!
//! let transport = HttpTransport::new("acme.us-west-2.api.example.io", "token");
//! let ctx = ReconcileContext::new(Arc::new(transport), RetryConfig::default())
//!     .with_file_transfer(Arc::new(HttpFileTransfer::new()));
//! println!("backend {}", ctx.backend_version());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod files;
pub mod http;
pub mod url;

pub use error::{Error, ErrorCategory, Result};
pub use files::HttpFileTransfer;
pub use http::HttpTransport;
pub use url::{CANONICAL_FORM, api_url, canonicalize_url};
