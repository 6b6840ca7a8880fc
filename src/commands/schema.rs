//! Offline schema inspection

use super::load_registry;
use crate::Context;
use crate::config;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use converge::{AttributeDefinition, ObjectTypeDefinition};

/// List object types, or describe one type's attributes.
pub fn run(ctx: &Context, object_type: Option<&str>) -> Result<()> {
    let local = config::local_settings(&ctx.overrides)?;
    let registry = load_registry(local.schema.as_deref())?;

    match object_type {
        None => {
            ui::header("Object types");
            for name in registry.type_names() {
                let def = registry.resolve(name)?;
                ui::kv(name, def.description.as_deref().unwrap_or(""));
            }
        }
        Some(name) => describe(registry.resolve(name)?),
    }
    Ok(())
}

fn describe(def: &ObjectTypeDefinition) {
    ui::header(&def.name);
    if let Some(doc) = &def.description {
        ui::dim(doc);
    }
    println!();
    for attr in def.attributes().filter(|a| !a.flags.internal) {
        println!(
            "  {} {} {}",
            attr.name.bold(),
            attr.attr_type.as_str().cyan(),
            flags(attr).join(" ").dimmed()
        );
        if let Some(doc) = &attr.description {
            ui::dim(&format!("  {doc}"));
        }
    }
}

/// Short markers shown beside an attribute.
fn flags(attr: &AttributeDefinition) -> Vec<String> {
    let mut out = Vec::new();
    if attr.flags.primary {
        out.push("primary".to_string());
    }
    if attr.flags.required {
        out.push("required".to_string());
    }
    if attr.flags.computed {
        out.push("computed".to_string());
    }
    if let Some(default) = &attr.default {
        out.push(format!("default={}", ui::display_value(default, 30)));
    }
    if let Some(min) = &attr.min_version {
        out.push(format!("since {}", min.raw));
    }
    if let Some(replacement) = &attr.deprecated_for {
        out.push(format!("deprecated: use {replacement}"));
    } else if attr.deprecated {
        out.push("deprecated".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::SchemaRegistry;

    #[test]
    fn test_flags() {
        let registry = SchemaRegistry::builtin().unwrap();
        let notebook = registry.resolve("notebook").unwrap();

        let data = flags(notebook.attribute("data").unwrap());
        assert!(data.contains(&"primary".to_string()));

        let query = flags(notebook.attribute("resource_query").unwrap());
        assert!(query.contains(&"deprecated: use allowed_resources_query".to_string()));

        let persisted = flags(notebook.attribute("is_run_output_persisted").unwrap());
        assert!(persisted.contains(&"since 12.3.0".to_string()));
    }
}
