use anyhow::{Context, Result};
use log::debug;
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::runtime::Runtime;

/// Prints the config loaded from `path` as pretty JSON, or `{}` when nothing
/// could be loaded.
#[tracing::instrument(skip(runtime, out))]
pub fn show_config<R: Runtime, W: Write>(runtime: R, path: &Path, out: &mut W) -> Result<()> {
    let config = Config::read(&runtime, path);
    debug!("Loaded {} config keys from {}", config.len(), path.display());

    let rendered = serde_json::to_string_pretty(&config).context("Failed to render config")?;
    writeln!(out, "{}", rendered).context("Failed to write config")?;
    Ok(())
}
