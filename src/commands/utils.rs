use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cli::ValueArgs;
use crate::config::{self, ClientConfig, LoggingConfig};
use crate::fields::FieldInput;

/// Initialize logging
///
/// `RUST_LOG` wins; otherwise `--verbose` means debug, else the configured level.
pub fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    Ok(())
}

/// Resolve the config path: explicit flag, else the per-user default
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config::get_config_path(),
    }
}

/// Load the configuration and start logging according to it
pub fn load_config_with_logging(explicit: Option<&Path>, verbose: bool) -> Result<ClientConfig> {
    let path = config_path(explicit)?;
    let config = ClientConfig::load(&path)
        .context("Failed to load client configuration. Run 'webpilot setup' first.")?;

    init_logging(verbose, &config.logging)?;
    tracing::debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Turn the `set` value flags into a field input
pub fn value_input(args: &ValueArgs) -> Result<FieldInput> {
    if let Some(time) = &args.time {
        return FieldInput::parse_time(time);
    }
    if let Some(checked) = &args.checked {
        return FieldInput::parse_checkbox(checked);
    }
    if let Some(select) = &args.select {
        return Ok(FieldInput::Select(select.clone()));
    }
    if let Some(value) = &args.value {
        return Ok(FieldInput::Text(value.clone()));
    }

    anyhow::bail!("A value is required (--value, --time, --checked or --select)")
}

/// Split `name=value`
pub fn parse_assignment(text: &str) -> Result<(String, String)> {
    let (name, value) = text
        .split_once('=')
        .with_context(|| format!("Expected name=value, got '{}'", text))?;

    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Field name missing in '{}'", text);
    }

    Ok((name.to_string(), value.to_string()))
}
