//! Command implementations
//!
//! Each backend command resolves settings, connects, and runs exactly one
//! reconciliation call through the engine.

pub mod objects;
pub mod schema;
pub mod version;

use crate::config::Settings;
use anyhow::{Context as AnyhowContext, Result, bail};
use converge::{Engine, ReconcileContext, RetryConfig, SchemaRegistry, VersionRecord};
use opclient::{HttpFileTransfer, HttpTransport};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

/// An engine plus the context of one backend connection.
pub struct Backend {
    pub engine: Engine,
    pub ctx: ReconcileContext,
}

/// Load the object type registry from a document, or the built-in one.
pub fn load_registry(schema: Option<&Path>) -> Result<SchemaRegistry> {
    match schema {
        Some(path) => {
            let document = fs::read_to_string(path)
                .with_context(|| format!("Could not read schema {}", path.display()))?;
            SchemaRegistry::load(&document)
                .with_context(|| format!("Invalid schema document {}", path.display()))
        }
        None => SchemaRegistry::builtin().context("Built-in schema failed to load"),
    }
}

/// Build the engine and backend context, enforcing `min_version`.
pub fn connect(settings: &Settings) -> Result<Backend> {
    let registry = load_registry(settings.schema.as_deref())?;
    let transport = HttpTransport::new(&settings.url, settings.token.clone());
    log::debug!("Backend {}", transport.base_url());

    let ctx = ReconcileContext::new(Arc::new(transport), RetryConfig::with_retries(settings.retries))
        .with_file_transfer(Arc::new(HttpFileTransfer::new()));
    if let Some(min) = &settings.min_version {
        check_min_version(&ctx, min)?;
    }

    Ok(Backend {
        engine: Engine::new(Arc::new(registry)),
        ctx,
    })
}

/// Refuse to continue against a backend older than `min`.
pub fn check_min_version(ctx: &ReconcileContext, min: &str) -> Result<()> {
    let want = VersionRecord::parse(min);
    if !want.is_valid() {
        bail!("Invalid min_version '{min}': expected major.minor.patch");
    }
    let have = ctx.backend_version();
    if !have.is_valid() {
        bail!("Could not read the backend version to check min_version {min}");
    }
    if have.is_below(&want) {
        bail!("Backend version {have} does not meet min_version {min}");
    }
    log::debug!("Backend version {have} satisfies min_version {min}");
    Ok(())
}

/// Read a JSON declaration from a file, or stdin for `-`.
pub fn read_declaration(path: &Path) -> Result<serde_json::Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Could not read declaration from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?
    };
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON declaration {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::MockTransport;

    fn context_with_tag(tag: Option<&str>) -> ReconcileContext {
        let mock = MockTransport::new();
        if let Some(tag) = tag {
            let inner = serde_json::json!({ "tag": tag }).to_string();
            let reply = serde_json::json!({ "get_backend_version": inner }).to_string();
            mock.respond(converge::context::VERSION_COMMAND, &reply);
        }
        ReconcileContext::new(Arc::new(mock), RetryConfig::immediate(1))
    }

    #[test]
    fn test_min_version_satisfied() {
        let ctx = context_with_tag(Some("release-12.3.1"));
        assert!(check_min_version(&ctx, "12.3.0").is_ok());
    }

    #[test]
    fn test_min_version_too_old() {
        let ctx = context_with_tag(Some("release-12.2.9"));
        let err = check_min_version(&ctx, "12.3.0").unwrap_err();
        assert!(err.to_string().contains("does not meet"));
    }

    #[test]
    fn test_min_version_dev_build_passes() {
        let ctx = context_with_tag(Some("master-abc123"));
        assert!(check_min_version(&ctx, "99.0.0").is_ok());
    }

    #[test]
    fn test_min_version_unknown_backend_fails() {
        let ctx = context_with_tag(None);
        assert!(check_min_version(&ctx, "1.0.0").is_err());
    }

    #[test]
    fn test_min_version_invalid() {
        let ctx = context_with_tag(Some("release-12.3.1"));
        let err = check_min_version(&ctx, "latest").unwrap_err();
        assert!(err.to_string().contains("Invalid min_version"));
    }

    #[test]
    fn test_read_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a1.json");
        fs::write(&path, r#"{"name":"a1","command":"ls"}"#).unwrap();
        let json = read_declaration(&path).unwrap();
        assert_eq!(json["name"], "a1");

        fs::write(&path, "{not json").unwrap();
        assert!(read_declaration(&path).is_err());
    }

    #[test]
    fn test_load_registry() {
        let builtin = load_registry(None).unwrap();
        assert!(builtin.resolve("action").is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        fs::write(&path, "[]").unwrap();
        assert!(load_registry(Some(&path)).is_err());
        assert!(load_registry(Some(&dir.path().join("missing.json"))).is_err());
    }
}
