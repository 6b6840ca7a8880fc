//! Object commands: apply, diff, read, delete

use super::{connect, read_declaration};
use crate::Context;
use crate::cli::{DeclArgs, ObjectArgs, OutputFormat};
use crate::config;
use crate::ui;
use anyhow::{Context as AnyhowContext, Result};
use converge::{ApplyOutcome, DesiredState, RemoteRecord};
use serde_json::json;

/// Create the object if missing, otherwise bring it in line.
pub fn apply(ctx: &Context, args: DeclArgs) -> Result<()> {
    let backend = connect(&config::load(ctx.overrides.clone())?)?;
    let def = backend.engine.resolve(&args.object_type)?;
    let desired = DesiredState::from_json(def, &read_declaration(&args.file)?)?;
    let name = desired.name().to_string();

    let (outcome, state) = backend
        .engine
        .apply(&backend.ctx, &args.object_type, &desired)
        .with_context(|| format!("Failed to apply {} '{name}'", args.object_type))?;

    match args.format {
        OutputFormat::Json => print_json(&json!({
            "outcome": outcome_label(outcome),
            "state": state.to_json(),
        }))?,
        OutputFormat::Text => {
            if !ctx.quiet {
                match outcome {
                    ApplyOutcome::Created => ui::success(&format!("Created {} '{name}'", args.object_type)),
                    ApplyOutcome::Updated => ui::success(&format!("Updated {} '{name}'", args.object_type)),
                    ApplyOutcome::Unchanged => {
                        ui::info(&format!("{} '{name}' is up to date", args.object_type));
                    }
                }
                ui::record(&args.object_type, &name, &state);
            }
        }
    }
    Ok(())
}

/// Show attributes whose declared value differs from the backend's.
pub fn diff(ctx: &Context, args: DeclArgs) -> Result<()> {
    let backend = connect(&config::load(ctx.overrides.clone())?)?;
    let def = backend.engine.resolve(&args.object_type)?;
    let desired = DesiredState::from_json(def, &read_declaration(&args.file)?)?;
    let name = desired.name().to_string();

    let diffs = match backend.engine.diff(&backend.ctx, &args.object_type, &desired) {
        Ok(diffs) => diffs,
        Err(e) if e.is_not_found() => {
            if args.format == OutputFormat::Json {
                return print_json(&json!({ "exists": false, "diffs": [] }));
            }
            ui::warn(&format!("{} '{name}' does not exist; apply will create it", args.object_type));
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to diff {} '{name}'", args.object_type));
        }
    };

    match args.format {
        OutputFormat::Json => print_json(&json!({ "exists": true, "diffs": diffs }))?,
        OutputFormat::Text => {
            if diffs.is_empty() {
                ui::success(&format!("{} '{name}' is up to date", args.object_type));
            } else {
                ui::header(&format!("{} {name}", args.object_type));
                ui::diffs(&diffs);
            }
        }
    }
    Ok(())
}

/// Print an object's current state.
pub fn read(ctx: &Context, args: ObjectArgs) -> Result<()> {
    let backend = connect(&config::load(ctx.overrides.clone())?)?;
    let state = backend
        .engine
        .read(&backend.ctx, &args.object_type, &DesiredState::new(&args.name))
        .with_context(|| format!("Failed to read {} '{}'", args.object_type, args.name))?;
    show(&args, &state)
}

/// Delete an object.
pub fn delete(ctx: &Context, args: ObjectArgs) -> Result<()> {
    let backend = connect(&config::load(ctx.overrides.clone())?)?;
    backend
        .engine
        .delete(&backend.ctx, &args.object_type, &args.name)
        .with_context(|| format!("Failed to delete {} '{}'", args.object_type, args.name))?;

    match args.format {
        OutputFormat::Json => print_json(&json!({ "deleted": args.name })),
        OutputFormat::Text => {
            if !ctx.quiet {
                ui::success(&format!("Deleted {} '{}'", args.object_type, args.name));
            }
            Ok(())
        }
    }
}

fn show(args: &ObjectArgs, state: &RemoteRecord) -> Result<()> {
    match args.format {
        OutputFormat::Json => print_json(&state.to_json()),
        OutputFormat::Text => {
            ui::record(&args.object_type, &args.name, state);
            Ok(())
        }
    }
}

fn outcome_label(outcome: ApplyOutcome) -> &'static str {
    match outcome {
        ApplyOutcome::Created => "created",
        ApplyOutcome::Updated => "updated",
        ApplyOutcome::Unchanged => "unchanged",
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
