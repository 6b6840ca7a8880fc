//! Reconciliation engine - create/read/update/delete over the schema
//!
//! Each entry point runs one reconciliation call to completion. Per-call
//! state (the lazily fetched backend version) lives in a [`Session`] that is
//! dropped when the call returns, so nothing leaks between calls or between
//! backends.

mod read;
mod write;

use crate::codec;
use crate::context::ReconcileContext;
use crate::diff::{AttributeDiff, compute_diffs};
use crate::error::{Error, Result};
use crate::schema::{ObjectTypeDefinition, SchemaRegistry};
use crate::types::{DesiredState, RemoteRecord};
use crate::version::VersionRecord;
use regex::Regex;
use std::cell::OnceCell;
use std::sync::{Arc, LazyLock};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid object name regex"));

/// What [`Engine::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The object did not exist and was created
    Created,
    /// The object existed and at least one command was issued
    Updated,
    /// The object already matched the declaration
    Unchanged,
}

/// State scoped to a single reconciliation call.
pub(crate) struct Session<'a> {
    pub(crate) ctx: &'a ReconcileContext,
    version: OnceCell<VersionRecord>,
}

impl<'a> Session<'a> {
    fn new(ctx: &'a ReconcileContext) -> Self {
        Self {
            ctx,
            version: OnceCell::new(),
        }
    }

    /// Backend version, fetched on first use.
    pub(crate) fn version(&self) -> &VersionRecord {
        self.version.get_or_init(|| self.ctx.backend_version())
    }
}

/// Schema-driven reconciliation of declared objects.
///
/// The engine itself is stateless apart from the shared, immutable registry;
/// everything call-specific comes in through the [`ReconcileContext`].
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<SchemaRegistry>,
}

impl Engine {
    /// Create an engine over a loaded registry.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Look up an object type definition.
    pub fn resolve(&self, type_name: &str) -> Result<&ObjectTypeDefinition> {
        self.registry.resolve(type_name)
    }

    /// Create an object and return its state as read back from the backend.
    ///
    /// Issues the define command with the primary attribute's literal, then
    /// writes every other declared attribute. If any write fails, a
    /// best-effort delete removes the partially configured object before the
    /// error is returned.
    pub fn create(
        &self,
        ctx: &ReconcileContext,
        type_name: &str,
        desired: &DesiredState,
    ) -> Result<RemoteRecord> {
        let def = self.resolve(type_name)?;
        let name = validate_name(def, desired)?;
        check_required(def, desired)?;

        let primary = def.primary();
        let value = desired
            .presence(primary)
            .value()
            .ok_or_else(|| Error::schema(&def.name, format!("primary attribute '{}' is not set", primary.name)))?;

        let session = Session::new(ctx);
        log::debug!("Creating {} '{name}'", def.name);
        let define = format!("{} {name} = {}", def.name, codec::render_attribute(primary, value));
        ctx.executor().execute_checked(&define)?;

        if let Err(e) = write::write_fields(&session, def, desired, None) {
            log::debug!("Create of {} '{name}' failed; removing it", def.name);
            if let Err(cleanup) = ctx.executor().execute_checked(&delete_command(name)) {
                log::warn!("Failed to remove partially created {} '{name}': {cleanup}", def.name);
            }
            return Err(e);
        }

        read::read_object(&session, def, desired)
    }

    /// Read an object's current state.
    ///
    /// The declaration is consulted for migration aliasing (`replaces`,
    /// `deprecated_for`); only its name is required.
    pub fn read(
        &self,
        ctx: &ReconcileContext,
        type_name: &str,
        desired: &DesiredState,
    ) -> Result<RemoteRecord> {
        let def = self.resolve(type_name)?;
        validate_name(def, desired)?;
        read::read_object(&Session::new(ctx), def, desired)
    }

    /// Bring an existing object in line with the declaration and return its
    /// new state.
    ///
    /// A failed write leaves the object as the backend has it; the error
    /// names the attribute that failed.
    pub fn update(
        &self,
        ctx: &ReconcileContext,
        type_name: &str,
        desired: &DesiredState,
    ) -> Result<RemoteRecord> {
        let def = self.resolve(type_name)?;
        validate_name(def, desired)?;
        let session = Session::new(ctx);
        let remote = read::read_object(&session, def, desired)?;
        write::write_fields(&session, def, desired, Some(&remote))?;
        read::read_object(&session, def, desired)
    }

    /// Delete an object.
    pub fn delete(&self, ctx: &ReconcileContext, type_name: &str, name: &str) -> Result<()> {
        let def = self.resolve(type_name)?;
        let name = validate_name(def, &DesiredState::new(name))?.to_string();
        log::debug!("Deleting {} '{name}'", def.name);
        ctx.executor().execute_checked(&delete_command(&name))?;
        Ok(())
    }

    /// Attributes whose declared value differs from the backend's.
    pub fn diff(
        &self,
        ctx: &ReconcileContext,
        type_name: &str,
        desired: &DesiredState,
    ) -> Result<Vec<AttributeDiff>> {
        let def = self.resolve(type_name)?;
        let remote = self.read(ctx, type_name, desired)?;
        Ok(compute_diffs(def, desired, &remote))
    }

    /// Create the object if it does not exist, otherwise update it.
    pub fn apply(
        &self,
        ctx: &ReconcileContext,
        type_name: &str,
        desired: &DesiredState,
    ) -> Result<(ApplyOutcome, RemoteRecord)> {
        let def = self.resolve(type_name)?;
        validate_name(def, desired)?;
        let session = Session::new(ctx);

        let remote = match read::read_object(&session, def, desired) {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                let created = self.create(ctx, type_name, desired)?;
                return Ok((ApplyOutcome::Created, created));
            }
            Err(e) => return Err(e),
        };

        if write::write_fields(&session, def, desired, Some(&remote))? {
            let updated = read::read_object(&session, def, desired)?;
            Ok((ApplyOutcome::Updated, updated))
        } else {
            Ok((ApplyOutcome::Unchanged, remote))
        }
    }
}

fn delete_command(name: &str) -> String {
    format!("delete {name}")
}

fn validate_name<'a>(def: &ObjectTypeDefinition, desired: &'a DesiredState) -> Result<&'a str> {
    let name = desired.name();
    if NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(Error::schema(
            &def.name,
            format!("invalid object name '{name}': use letters, digits and underscores"),
        ))
    }
}

fn check_required(def: &ObjectTypeDefinition, desired: &DesiredState) -> Result<()> {
    let missing: Vec<&str> = def
        .attributes()
        .filter(|a| a.flags.required && !a.flags.internal)
        .filter(|a| desired.presence(a).value().is_none())
        .map(|a| a.name.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::schema(
            &def.name,
            format!("missing required attributes: {}", missing.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RetryConfig;
    use crate::files::MockFileTransfer;
    use crate::transport::MockTransport;
    use crate::types::AttrValue;
    use serde_json::json;
    use std::path::PathBuf;

    fn engine() -> Engine {
        Engine::new(Arc::new(SchemaRegistry::builtin().unwrap()))
    }

    fn setup() -> (Engine, MockTransport, ReconcileContext) {
        let engine = engine();
        let mock = MockTransport::new();
        let ctx = ReconcileContext::new(Arc::new(mock.clone()), RetryConfig::immediate(1));
        (engine, mock, ctx)
    }

    const VERSION: &str = crate::context::VERSION_COMMAND;

    fn context_with(mock: &MockTransport, attempts: u32) -> ReconcileContext {
        ReconcileContext::new(Arc::new(mock.clone()), RetryConfig::immediate(attempts))
    }

    fn listing(ty: &str, name: &str, attributes: serde_json::Value) -> (String, String) {
        let mut attributes = attributes;
        attributes["name"] = json!(name);
        (
            format!(r#"list {ty}s | name = "{name}""#),
            json!({ "list_type": { "symbol": [ { "attributes": attributes } ] } }).to_string(),
        )
    }

    fn respond_listing(mock: &MockTransport, ty: &str, name: &str, attributes: serde_json::Value) {
        let (cmd, resp) = listing(ty, name, attributes);
        mock.respond(&cmd, &resp);
    }

    fn backend_version(mock: &MockTransport, tag: &str) {
        let build = json!({ "tag": tag, "build_date": "2024-01-01" }).to_string();
        mock.respond(VERSION, &json!({ "get_backend_version": build }).to_string());
    }

    /// Commands that write state, ignoring reads.
    fn writes(mock: &MockTransport) -> Vec<String> {
        mock.commands()
            .into_iter()
            .filter(|c| !c.starts_with("list ") && !c.starts_with("get_") && c != VERSION)
            .collect()
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (engine, mock, ctx) = setup();
        let desired = DesiredState::new("bad name").with("command", "ls");
        let err = engine.create(&ctx, "action", &desired).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Schema);
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn test_missing_required_rejected() {
        let (engine, mock, ctx) = setup();
        let err = engine
            .create(&ctx, "action", &DesiredState::new("a1"))
            .unwrap_err();
        assert!(err.to_string().contains("command"));
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn test_unknown_type() {
        let (engine, _, ctx) = setup();
        let err = engine.delete(&ctx, "gizmo", "g1").unwrap_err();
        assert!(matches!(err, Error::UnknownType(_)));
    }

    #[test]
    fn test_delete_issues_single_command() {
        let (engine, mock, ctx) = setup();
        engine.delete(&ctx, "action", "a1").unwrap();
        assert_eq!(mock.commands(), vec!["delete a1"]);
    }

    #[test]
    fn test_session_fetches_version_once() {
        let (_, mock, ctx) = setup();
        let session = Session::new(&ctx);
        session.version();
        session.version();
        assert_eq!(mock.commands(), vec![VERSION]);
    }

    #[test]
    fn test_create_action_end_to_end() {
        let mock = MockTransport::new();
        respond_listing(&mock, "action", "a1", json!({ "command": "echo hi", "timeout": 30 }));
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("timeout", 30);
        let state = engine().create(&ctx, "action", &desired).unwrap();

        assert_eq!(writes(&mock), vec![r#"action a1 = "echo hi""#, "a1.timeout = 30"]);
        assert_eq!(state.get("name"), Some(&AttrValue::from("a1")));
        assert_eq!(state.get("command"), Some(&AttrValue::from("echo hi")));
        assert_eq!(state.get("timeout"), Some(&AttrValue::Int(30)));
        assert_eq!(state.get("enabled"), Some(&AttrValue::Bool(false)));
        assert!(state.is_cleared("description"));
    }

    #[test]
    fn test_update_enables_last() {
        let mock = MockTransport::new();
        respond_listing(
            &mock,
            "action",
            "a1",
            json!({ "command": "echo hi", "timeout": 60000, "enabled": 0, "description": "old" }),
        );
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("description", "new")
            .with("enabled", true);
        engine().update(&ctx, "action", &desired).unwrap();

        assert_eq!(writes(&mock), vec![r#"a1.description = "new""#, "enable a1"]);
    }

    #[test]
    fn test_enabled_object_is_reenabled_after_change() {
        let mock = MockTransport::new();
        respond_listing(
            &mock,
            "action",
            "a1",
            json!({ "command": "echo hi", "timeout": 60000, "enabled": 1 }),
        );
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("timeout", 10)
            .with("enabled", true);
        let (outcome, _) = engine().apply(&ctx, "action", &desired).unwrap();

        assert_eq!(outcome, ApplyOutcome::Updated);
        assert_eq!(writes(&mock), vec!["a1.timeout = 10", "enable a1"]);
    }

    #[test]
    fn test_apply_unchanged_issues_no_writes() {
        let mock = MockTransport::new();
        respond_listing(&mock, "action", "a1", json!({ "command": "echo hi", "timeout": 60000 }));
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1").with("command", "echo hi");
        let (outcome, _) = engine().apply(&ctx, "action", &desired).unwrap();

        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(writes(&mock).is_empty());
    }

    #[test]
    fn test_apply_creates_missing_object() {
        let mock = MockTransport::new();
        let (cmd, found) = listing("resource", "r1", json!({ "value": "hosts" }));
        mock.respond(&cmd, r#"{"list_type":{"symbol":[]}}"#);
        mock.respond(&cmd, &found);
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("r1").with("value", "hosts");
        let (outcome, state) = engine().apply(&ctx, "resource", &desired).unwrap();

        assert_eq!(outcome, ApplyOutcome::Created);
        assert_eq!(writes(&mock), vec!["resource r1 = hosts"]);
        assert_eq!(state.get("value"), Some(&AttrValue::from("hosts")));
    }

    #[test]
    fn test_read_not_found() {
        let mock = MockTransport::new();
        let ctx = context_with(&mock, 3);
        let err = engine()
            .read(&ctx, "action", &DesiredState::new("ghost"))
            .unwrap_err();
        assert!(err.is_not_found());
        // not retried
        assert_eq!(mock.commands().len(), 1);
    }

    #[test]
    fn test_create_failure_deletes_partial_object() {
        let mock = MockTransport::new();
        let failure = json!({ "update_action": { "error": { "message": "bad timeout" } } }).to_string();
        mock.respond("a1.timeout = -5", &failure);
        let ctx = context_with(&mock, 2);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("timeout", -5);
        let err = engine().create(&ctx, "action", &desired).unwrap_err();

        match &err {
            Error::Attribute { attribute, source, .. } => {
                assert_eq!(attribute, "timeout");
                assert!(matches!(**source, Error::Semantic { ref message } if message == "bad timeout"));
            }
            other => panic!("expected attribute error, got {other:?}"),
        }
        assert_eq!(
            writes(&mock),
            vec![
                r#"action a1 = "echo hi""#,
                "a1.timeout = -5",
                "a1.timeout = -5",
                "delete a1"
            ]
        );
    }

    #[test]
    fn test_semantic_error_unwraps_nested_message() {
        let mock = MockTransport::new();
        let failure = json!({
            "define_bot": {
                "error": { "message": r#"outer failure message: \"inner message: \\\"root cause\\\"\""# }
            }
        });
        mock.respond(r#"bot b1 = if high_cpu then restart fi"#, &failure.to_string());
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("b1").with("command", "if high_cpu then restart fi");
        let err = engine().create(&ctx, "bot", &desired).unwrap_err();
        assert!(matches!(err, Error::Semantic { ref message } if message == "root cause"));
    }

    #[test]
    fn test_retries_use_fresh_tokens() {
        let mock = MockTransport::new();
        mock.fail("delete a1", "connection reset");
        mock.respond("delete a1", "{}");
        let ctx = context_with(&mock, 3);

        engine().delete(&ctx, "action", "a1").unwrap();

        let tokens = mock.tokens();
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
        assert!(tokens.iter().all(|t| t.len() == 32 && t.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn test_compound_update_writes_only_changed_part() {
        let mock = MockTransport::new();
        respond_listing(
            &mock,
            "bot",
            "b1",
            json!({ "alarm_statement": "high_cpu", "action_statement": "restart", "enabled": 0 }),
        );
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("b1").with("command", "if high_cpu then page_oncall fi");
        engine().update(&ctx, "bot", &desired).unwrap();

        assert_eq!(writes(&mock), vec!["b1.action_statement = page_oncall"]);
    }

    #[test]
    fn test_read_recomposes_compound() {
        let mock = MockTransport::new();
        respond_listing(
            &mock,
            "bot",
            "b1",
            json!({ "alarm_statement": "high_cpu", "action_statement": "restart" }),
        );
        let ctx = context_with(&mock, 1);

        let state = engine().read(&ctx, "bot", &DesiredState::new("b1")).unwrap();
        assert_eq!(
            state.get("command"),
            Some(&AttrValue::from("if high_cpu then restart fi"))
        );
    }

    #[test]
    fn test_version_gate_rejects_explicit_value() {
        let mock = MockTransport::new();
        backend_version(&mock, "release-14.0.2");
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("communication_channel", "#ops");
        let err = engine().create(&ctx, "action", &desired).unwrap_err();

        assert!(matches!(err, Error::VersionGate { ref attribute, .. } if attribute == "communication_channel"));
        assert!(!writes(&mock).iter().any(|c| c.contains("communication_channel")));
        assert_eq!(writes(&mock).last().map(String::as_str), Some("delete a1"));
    }

    #[test]
    fn test_version_gate_allows_newer_backend() {
        let mock = MockTransport::new();
        backend_version(&mock, "release-14.1.0");
        respond_listing(&mock, "action", "a1", json!({ "command": "echo hi" }));
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("communication_channel", "ops");
        engine().create(&ctx, "action", &desired).unwrap();

        assert!(writes(&mock).contains(&r#"a1.communication_channel = "ops""#.to_string()));
    }

    #[test]
    fn test_version_fetched_once_per_call() {
        let mock = MockTransport::new();
        backend_version(&mock, "master-build");
        respond_listing(&mock, "action", "a1", json!({ "command": "echo hi" }));
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo hi")
            .with("communication_workspace", "ws")
            .with("communication_channel", "ch");
        engine().create(&ctx, "action", &desired).unwrap();

        let fetches = mock.commands().iter().filter(|c| *c == VERSION).count();
        assert_eq!(fetches, 1);
    }

    #[test]
    fn test_deprecated_attribute_retries_replacement_name() {
        let mock = MockTransport::new();
        backend_version(&mock, "release-13.0.0");
        let notebook = json!({ "cells": [] }).to_string();
        respond_listing(&mock, "notebook", "nb", json!({ "resource_query": "hosts" }));
        mock.fail(r#"nb.resource_query = "pods""#, "unknown field");
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("nb")
            .with("data", notebook)
            .with("resource_query", "pods");
        engine().update(&ctx, "notebook", &desired).unwrap();

        let writes = writes(&mock);
        let first = writes.iter().position(|c| c == r#"nb.resource_query = "pods""#).unwrap();
        assert_eq!(writes[first + 1], r#"nb.allowed_resources_query = "pods""#);
    }

    #[test]
    fn test_notebook_read_omits_dynamic_fields() {
        let mock = MockTransport::new();
        respond_listing(&mock, "notebook", "nb", json!({}));
        let described = json!({
            "get_notebook_class": {
                "notebook_classes": [ {
                    "name": "nb",
                    "tempId": 17,
                    "cacheKey": "abc",
                    "cells": [ { "content": "ls", "run_id": 9 } ],
                    "dynamic_fields": ["tempId", "cacheKey", "dynamic_fields", "dynamic_cell_fields"],
                    "dynamic_cell_fields": ["run_id"],
                } ]
            }
        });
        mock.respond(
            r#"get_notebook_class( notebook_name = "nb" )"#,
            &described.to_string(),
        );
        let ctx = context_with(&mock, 1);

        let state = engine().read(&ctx, "notebook", &DesiredState::new("nb")).unwrap();
        assert_eq!(
            state.get("data"),
            Some(&AttrValue::from(r#"{"cells":[{"content":"ls"}]}"#))
        );
    }

    #[test]
    fn test_file_upload_through_presigned_url() {
        let mock = MockTransport::new();
        mock.respond("f1.uri", r#"{"get_file_attribute":"s3://bucket/f1"}"#);
        mock.respond("f1.presigned_put", r#"{"get_file_attribute":"https://put.example/f1"}"#);
        respond_listing(&mock, "file", "f1", json!({ "destination_path": "/opt/f1" }));

        let files = MockFileTransfer::new();
        files.add_file("/tmp/f1.sh", b"#!/bin/sh\n", "abc123");
        let ctx = context_with(&mock, 1).with_file_transfer(Arc::new(files.clone()));

        let desired = DesiredState::new("f1")
            .with("destination_path", "/opt/f1")
            .with("resource_query", "hosts")
            .with("input_file", "/tmp/f1.sh");
        engine().create(&ctx, "file", &desired).unwrap();

        let writes = writes(&mock);
        assert!(writes.contains(&r#"f1.file_data = ":s3://bucket/f1""#.to_string()));
        assert!(writes.contains(&"f1.file_length = 10".to_string()));
        assert!(writes.contains(&r#"f1.checksum = "abc123""#.to_string()));
        assert_eq!(
            files.uploads(),
            vec![(PathBuf::from("/tmp/f1.sh"), "https://put.example/f1".to_string())]
        );
    }

    #[test]
    fn test_file_inline_when_no_remote_uri() {
        let mock = MockTransport::new();
        mock.respond("f1.uri", r#"{"get_file_attribute":"get file attribute failed: field does not exist"}"#);
        respond_listing(&mock, "file", "f1", json!({ "destination_path": "/opt/f1" }));

        let files = MockFileTransfer::new();
        files.add_file("/tmp/f1.sh", b"hello", "5d41402abc4b2a76b9719d911017c592");
        let ctx = context_with(&mock, 1).with_file_transfer(Arc::new(files.clone()));

        let desired = DesiredState::new("f1")
            .with("destination_path", "/opt/f1")
            .with("resource_query", "hosts")
            .with("input_file", "/tmp/f1.sh");
        engine().create(&ctx, "file", &desired).unwrap();

        assert!(writes(&mock).contains(&r#"f1.file_data = "aGVsbG8=""#.to_string()));
        assert!(files.uploads().is_empty());
    }

    #[test]
    fn test_file_missing_is_file_transfer_error() {
        let mock = MockTransport::new();
        let ctx = context_with(&mock, 1).with_file_transfer(Arc::new(MockFileTransfer::new()));

        let desired = DesiredState::new("f1")
            .with("destination_path", "/opt/f1")
            .with("resource_query", "hosts")
            .with("input_file", "/tmp/missing");
        let err = engine().create(&ctx, "file", &desired).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::FileTransfer);
    }

    #[test]
    fn test_diff_reports_changed_attributes() {
        let mock = MockTransport::new();
        respond_listing(
            &mock,
            "action",
            "a1",
            json!({ "command": "echo hi", "timeout": 60000, "enabled": 0 }),
        );
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("a1")
            .with("command", "echo bye")
            .with("timeout", 60000);
        let diffs = engine().diff(&ctx, "action", &desired).unwrap();
        let names: Vec<&str> = diffs.iter().map(|d| d.attribute.as_str()).collect();
        assert_eq!(names, vec!["command"]);
        assert!(writes(&mock).is_empty());
    }

    #[test]
    fn test_notebook_without_dynamic_field_tags_has_no_data_diff() {
        let mock = MockTransport::new();
        respond_listing(&mock, "notebook", "nb", json!({ "description": "d", "timeout_ms": 60000 }));
        let described = json!({
            "get_notebook_class": {
                "notebook_classes": [ {
                    "name": "nb",
                    "description": "d",
                    "timeout_ms": 60000,
                    "enabled": true,
                    "cells": [ { "content": "ls" } ],
                } ]
            }
        });
        mock.respond(r#"get_notebook_class( notebook_name = "nb" )"#, &described.to_string());
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("nb")
            .with("data", json!({ "cells": [ { "content": "ls" } ] }).to_string())
            .with("description", "d");
        let diffs = engine().diff(&ctx, "notebook", &desired).unwrap();
        assert!(diffs.iter().all(|d| d.attribute != "data"), "{diffs:?}");
    }

    #[test]
    fn test_file_payload_written_before_other_fields() {
        let mock = MockTransport::new();
        mock.respond("f1.uri", r#"{"get_file_attribute":"get file attribute failed: field does not exist"}"#);
        respond_listing(&mock, "file", "f1", json!({ "destination_path": "/opt/f1" }));

        let files = MockFileTransfer::new();
        files.add_file("/tmp/f1.sh", b"hello", "5d41402abc4b2a76b9719d911017c592");
        let ctx = context_with(&mock, 1).with_file_transfer(Arc::new(files));

        let desired = DesiredState::new("f1")
            .with("destination_path", "/opt/f1")
            .with("description", "deploy script")
            .with("resource_query", "hosts")
            .with("input_file", "/tmp/f1.sh");
        engine().create(&ctx, "file", &desired).unwrap();

        let fields: Vec<String> = writes(&mock)
            .into_iter()
            .filter(|c| c.starts_with("f1.") && c.contains(" = "))
            .collect();
        assert_eq!(
            fields,
            vec![
                r#"f1.file_data = "aGVsbG8=""#,
                "f1.file_length = 5",
                r#"f1.checksum = "5d41402abc4b2a76b9719d911017c592""#,
                r#"f1.description = "deploy script""#,
                r#"f1.resource_query = "hosts""#,
            ]
        );
    }

    #[test]
    fn test_forced_keys_without_value_are_reset() {
        let mock = MockTransport::new();
        backend_version(&mock, "release-12.0.0");
        respond_listing(&mock, "notebook", "nb", json!({}));
        let described = json!({
            "get_notebook_class": { "notebook_classes": [ { "name": "nb", "cells": [] } ] }
        });
        mock.respond(r#"get_notebook_class( notebook_name = "nb" )"#, &described.to_string());
        let ctx = context_with(&mock, 1);

        let desired = DesiredState::new("nb")
            .with("data", json!({ "cells": [ { "content": "ls" } ] }).to_string());
        engine().update(&ctx, "notebook", &desired).unwrap();

        let writes = writes(&mock);
        assert!(writes.iter().any(|c| c.starts_with("nb.data = ")));
        assert!(writes.contains(&"nb.allowed_entities = [  ]".to_string()));
        assert!(writes.contains(&"nb.approvers = [  ]".to_string()));
        // too new for this backend and not declared
        assert!(!writes.iter().any(|c| c.contains("is_run_output_persisted")));
    }
}
