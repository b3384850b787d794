use std::fs;

use anyhow::{Context, Result};
use shared::config::Config;

/// Writes a configuration file with default values in `format` (yaml, json or
/// toml) to the current directory.
///
/// # Errors
/// Returns an error if the format is unsupported or writing the file fails.
pub fn generate_config(format: &str) -> Result<()> {
    let serialized = Config::with_defaults().to_format_string(format)?;
    let file_name = format!("config.{format}");

    fs::write(&file_name, serialized)
        .with_context(|| format!("failed to write configuration file '{file_name}'"))?;

    println!("Configuration file '{file_name}' generated successfully.");
    Ok(())
}
