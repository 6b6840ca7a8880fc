use super::connect;
use crate::Context;
use crate::config;
use crate::ui;
use anyhow::{Result, bail};

/// Print the backend version record.
pub fn run(ctx: &Context) -> Result<()> {
    let settings = config::load(ctx.overrides.clone())?;
    let backend = connect(&settings)?;
    let version = backend.ctx.backend_version();
    if !version.is_valid() {
        bail!("Could not determine the version of {}", settings.url);
    }

    if ctx.quiet {
        println!("{}.{}.{}", version.major, version.minor, version.patch);
    } else {
        ui::header("Backend");
        ui::kv("url", &settings.url);
        ui::kv("version", &format!("{}.{}.{}", version.major, version.minor, version.patch));
        ui::kv("build", &version.raw);
    }
    Ok(())
}
