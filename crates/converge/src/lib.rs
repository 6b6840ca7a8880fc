//! # Converge
//!
//! Schema-driven reconciliation of declared objects against a backend that
//! only accepts imperative, string-based commands and answers with JSON.
//!
//! The crate turns a declarative attribute schema into per-field commands,
//! decodes backend JSON into typed attribute values, and executes commands
//! with bounded retry and per-attempt idempotency tokens.
//!
//! ## Core Concepts
//!
//! - **SchemaRegistry**: Object types and their attributes, parsed once from a
//!   configuration document and immutable afterwards
//! - **Codec**: Typed value to command literal, and backend JSON to typed value
//! - **Compound attributes**: One backend field split into several declared
//!   attributes via regex capture and template interpolation
//! - **VersionRecord**: Backend version gating of attribute writes
//! - **CommandExecutor**: Retrying, idempotent execution of a single command
//! - **Engine**: Create/read/update/delete over all of the above
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use converge::{
//!     AttrValue, DesiredState, Engine, MockTransport, ReconcileContext, RetryConfig,
//!     SchemaRegistry,
//! };
//!
//! let registry = Arc::new(SchemaRegistry::builtin().unwrap());
//! let engine = Engine::new(registry);
//!
//! let transport = MockTransport::new();
//! transport.respond(
//!     r#"list actions | name = "a1""#,
//!     r#"{"list_type":{"symbol":[{"attributes":{"name":"a1","command":"echo hi","timeout":30}}]}}"#,
//! );
//! let ctx = ReconcileContext::new(Arc::new(transport.clone()), RetryConfig::immediate(1));
//!
//! let desired = DesiredState::new("a1")
//!     .with("command", "echo hi")
//!     .with("timeout", 30);
//! let state = engine.create(&ctx, "action", &desired).unwrap();
//!
//! assert_eq!(transport.commands()[0], r#"action a1 = "echo hi""#);
//! assert_eq!(transport.commands()[1], "a1.timeout = 30");
//! assert_eq!(state.get("timeout"), Some(&AttrValue::Int(30)));
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`Transport`]: delivers a command string with an idempotency token
//! - [`FileTransfer`]: uploads local files and computes their checksums
//!
//! Both come with in-memory mocks ([`MockTransport`], [`MockFileTransfer`])
//! so the engine can be exercised without network access.

pub mod codec;
pub mod compound;
pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod files;
pub mod keypath;
pub mod normalize;
pub mod schema;
pub mod transport;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use context::ReconcileContext;
pub use diff::{AttributeDiff, DiffSummary, compute_diffs, equivalent};
pub use engine::{ApplyOutcome, Engine};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{CommandExecutor, RetryCallback, RetryConfig};
pub use files::{FileTransfer, MockFileTransfer};
pub use keypath::KeyPath;
pub use schema::{
    AttributeDefinition, AttributeType, CastType, ObjectTypeDefinition, SchemaRegistry,
};
pub use transport::{MockTransport, Transport};
pub use types::{AttrValue, DesiredState, Presence, RemoteRecord};
pub use version::VersionRecord;
