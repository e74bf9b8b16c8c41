use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// `<cache_dir>/cyber-advisor/advisor.log`, or the working directory
pub fn log_path() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("cyber-advisor"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("advisor.log")
}

/// Send `tracing` output to the log file.
///
/// stderr belongs to the terminal UI, so nothing is ever written there.
/// Filtering follows `RUST_LOG` and defaults to `info`.
pub fn init() -> Result<PathBuf> {
    let path = log_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    Ok(path)
}
