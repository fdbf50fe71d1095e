use anyhow::{Context, Result};
use std::path::PathBuf;

/// Directory holding growclone's configuration file.
///
/// Only resolved, never created: the configuration is optional and read-only.
pub fn growclone_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("growclone");
    Ok(config_dir)
}

pub fn default_config_file() -> Result<PathBuf> {
    Ok(growclone_config_dir()?.join("config.toml"))
}
