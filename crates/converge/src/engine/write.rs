//! Writing attribute values to the backend.

use super::Session;
use crate::codec;
use crate::compound;
use crate::diff::equivalent;
use crate::error::{Error, Result};
use crate::schema::{AttributeDefinition, ObjectTypeDefinition};
use crate::types::{AttrValue, DesiredState, Presence, RemoteRecord};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const ENABLED: &str = "enabled";
const INPUT_FILE: &str = "input_file";

/// Writes one object's fields during a create or update.
struct FieldWriter<'s, 'c> {
    session: &'s Session<'c>,
    def: &'s ObjectTypeDefinition,
    desired: &'s DesiredState,
    remote: Option<&'s RemoteRecord>,
}

/// Write every attribute that needs it, then settle `enabled`.
///
/// With no `remote` (creation) only declared attributes are written and the
/// primary is skipped, since the define command already carried it. With a
/// `remote`, attributes are written when their effective value is not
/// equivalent to the observed one, or when an earlier write forces them.
///
/// Returns whether any command was issued.
pub(crate) fn write_fields(
    session: &Session<'_>,
    def: &ObjectTypeDefinition,
    desired: &DesiredState,
    remote: Option<&RemoteRecord>,
) -> Result<bool> {
    let writer = FieldWriter {
        session,
        def,
        desired,
        remote,
    };
    writer.run()
}

impl FieldWriter<'_, '_> {
    fn name(&self) -> &str {
        self.desired.name()
    }

    fn creating(&self) -> bool {
        self.remote.is_none()
    }

    fn run(&self) -> Result<bool> {
        let forced = self.stage_file()?;
        let mut force_keys: BTreeSet<String> = BTreeSet::new();
        let mut any_change = false;
        let order = self.def.write_order();

        // staged file payload goes out before anything else
        for attr in &order {
            if let Some(value) = forced.get(&attr.name) {
                self.set_field(attr, &codec::render_attribute(attr, value))?;
                any_change = true;
            }
        }

        for attr in order {
            if attr.name == ENABLED || forced.contains_key(&attr.name) {
                continue;
            }
            if !attr.is_writable() || (self.creating() && attr.flags.primary) {
                continue;
            }

            if self.write_attribute(attr, &force_keys)? {
                any_change = true;
                if self.def.write_first.contains(&attr.name) {
                    if let Some(rules) = &attr.json {
                        force_keys.extend(rules.force_set.iter().cloned());
                    }
                }
            }
        }

        let toggled = self.settle_enabled(any_change)?;
        Ok(any_change || toggled)
    }

    /// Write one attribute if it needs it. Returns whether it was written.
    fn write_attribute(&self, attr: &AttributeDefinition, force_keys: &BTreeSet<String>) -> Result<bool> {
        let presence = self.desired.presence(attr);
        let forced = self.remote.is_some() && force_keys.contains(&attr.name);
        let zero;
        let value = match presence.value() {
            Some(value) => value,
            None if forced => {
                zero = attr.default_or_zero();
                &zero
            }
            None => return Ok(false),
        };

        if let Some(min) = &attr.min_version {
            let backend = self.session.version();
            if backend.is_below(min) {
                return self.gate(attr, presence, value, min, backend);
            }
        }

        let needed = match self.remote {
            None => presence.is_explicit(),
            Some(remote) => forced || !equivalent(attr, value, remote.get(&attr.name)),
        };
        if !needed {
            log::debug!("{} '{}': '{}' unchanged", self.def.name, self.name(), attr.name);
            return Ok(false);
        }

        if attr.compound.is_some() {
            self.write_compound(attr, value)
        } else {
            self.set_field(attr, &codec::render_attribute(attr, value))?;
            Ok(true)
        }
    }

    /// An attribute the backend is too old for: skip it, unless the caller
    /// explicitly asked for a non-default value.
    fn gate(
        &self,
        attr: &AttributeDefinition,
        presence: Presence<'_>,
        value: &AttrValue,
        min: &crate::VersionRecord,
        backend: &crate::VersionRecord,
    ) -> Result<bool> {
        let default = attr.default_or_zero();
        if presence.is_explicit() && !equivalent(attr, value, Some(&default)) {
            return Err(Error::VersionGate {
                object: self.name().to_string(),
                attribute: attr.name.clone(),
                required: min.raw.clone(),
                backend: backend.raw.clone(),
            });
        }
        log::debug!(
            "Skipping '{}': requires {}, backend is {backend}",
            attr.name,
            min.raw
        );
        Ok(false)
    }

    /// Write only the sub-fields of a compound attribute whose decomposed
    /// value changed.
    fn write_compound(&self, attr: &AttributeDefinition, value: &AttrValue) -> Result<bool> {
        let Some(spec) = &attr.compound else {
            return Ok(false);
        };
        let wrap = |e| self.attribute_error(attr, e);

        let new_parts = compound::decompose(&spec.regex, &value.to_text()).map_err(wrap)?;
        let old_parts = self
            .remote
            .and_then(|r| r.get(&attr.name))
            .and_then(|old| compound::decompose(&spec.regex, &old.to_text()).ok())
            .unwrap_or_default();

        let changed = compound::changed_parts(&old_parts, &new_parts);
        for (sub, text) in &changed {
            let Some(sub_attr) = self.def.attribute(sub) else {
                continue;
            };
            let literal = codec::render_attribute(sub_attr, &AttrValue::from(*text));
            self.set_field(sub_attr, &literal)?;
        }
        Ok(!changed.is_empty())
    }

    /// Issue `<name>.<field> = <literal>`. A deprecated attribute is retried
    /// once under its replacement's name.
    fn set_field(&self, attr: &AttributeDefinition, literal: &str) -> Result<()> {
        let executor = self.session.ctx.executor();
        let command = format!("{}.{} = {literal}", self.name(), attr.write_name());
        log::debug!("Setting {} '{}': {}", self.def.name, self.name(), attr.name);

        let Err(first) = executor.execute_checked(&command) else {
            return Ok(());
        };
        let Some(replacement) = attr.deprecated_for.as_deref().and_then(|r| self.def.attribute(r)) else {
            return Err(self.attribute_error(attr, first));
        };

        log::debug!(
            "Write of '{}' failed ({first}); retrying as '{}'",
            attr.name,
            replacement.name
        );
        let retry = format!("{}.{} = {literal}", self.name(), replacement.write_name());
        executor
            .execute_checked(&retry)
            .map(|_| ())
            .map_err(|e| self.attribute_error(attr, e))
    }

    /// Issue the final enable/disable command when needed.
    ///
    /// The backend disables an object on any other property write, so an
    /// enabled object is re-enabled after every change.
    fn settle_enabled(&self, any_change: bool) -> Result<bool> {
        let Some(attr) = self.def.attribute(ENABLED) else {
            return Ok(false);
        };
        let presence = self.desired.presence(attr);
        let enable = presence.value().and_then(AttrValue::as_bool).unwrap_or(false);

        let toggled = match self.remote {
            None => presence.is_explicit(),
            Some(remote) => !equivalent(attr, &AttrValue::Bool(enable), remote.get(ENABLED)),
        };
        if !toggled && !(enable && any_change) {
            return Ok(false);
        }

        let verb = if enable { "enable" } else { "disable" };
        self.session
            .ctx
            .executor()
            .execute_checked(&format!("{verb} {}", self.name()))
            .map_err(|e| self.attribute_error(attr, e))?;
        Ok(true)
    }

    /// Compute file payload values when a local file is declared.
    ///
    /// When the backend reports a storage URI for the object the file goes
    /// through its presigned upload URL; otherwise the data is sent inline.
    /// On update, nothing is staged while the remote checksum and length
    /// still match.
    fn stage_file(&self) -> Result<BTreeMap<String, AttrValue>> {
        let mut forced = BTreeMap::new();
        if self.def.attribute(INPUT_FILE).is_none() {
            return Ok(forced);
        }
        let Some(input) = self.desired.get(INPUT_FILE).and_then(AttrValue::as_str) else {
            return Ok(forced);
        };
        let files = self.session.ctx.files().ok_or_else(|| {
            Error::FileTransfer(format!("no file transfer configured for '{input}'"))
        })?;
        let path = Path::new(input);

        let (checksum, size) = files.checksum_and_size(path)?;
        if size == 0 {
            return Err(Error::FileTransfer(format!("{input}: file is empty")));
        }
        let size = i64::try_from(size)
            .map_err(|_| Error::FileTransfer(format!("{input}: file is too large")))?;

        if let Some(remote) = self.remote {
            let same_sum = remote.get("checksum").and_then(AttrValue::as_str) == Some(checksum.as_str());
            let same_len = remote.get("file_length") == Some(&AttrValue::Int(size));
            if same_sum && same_len {
                log::debug!("File '{}' unchanged ({checksum})", self.name());
                return Ok(forced);
            }
        }

        let uri = self.file_attribute("uri")?;
        let data = if uri.is_empty() {
            files.encode_inline(path)?
        } else {
            let put = self.file_attribute("presigned_put")?;
            if put.is_empty() {
                return Err(Error::FileTransfer(format!(
                    "no presigned upload URL for file object '{}'",
                    self.name()
                )));
            }
            files.upload(path, &put)?;
            format!(":{uri}")
        };

        forced.insert("file_data".to_string(), AttrValue::Str(data));
        forced.insert("file_length".to_string(), AttrValue::Int(size));
        forced.insert("checksum".to_string(), AttrValue::Str(checksum));
        Ok(forced)
    }

    /// Query `<name>.<field>` of a file object. Backend "failed" answers
    /// count as empty.
    fn file_attribute(&self, field: &str) -> Result<String> {
        let response = self
            .session
            .ctx
            .executor()
            .execute_json(&format!("{}.{field}", self.name()))?;
        let value = response
            .get("get_file_attribute")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if value.contains("failed:") || value.contains("field does not exist") {
            return Ok(String::new());
        }
        Ok(value.to_string())
    }

    fn attribute_error(&self, attr: &AttributeDefinition, source: Error) -> Error {
        Error::Attribute {
            object_type: self.def.name.clone(),
            object: self.name().to_string(),
            attribute: attr.name.clone(),
            source: Box::new(source),
        }
    }
}
