//! Logging setup

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::info;

/// Default directory for log files (~/.local/share/ratequeue/logs on Linux)
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ratequeue")
        .join("logs")
}

/// Install a global tracing subscriber writing to `<log_dir>/ratequeue.log`
///
/// The level directive is added on top of whatever `RUST_LOG` specifies.
/// Fails if a global subscriber is already installed.
pub fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    // Write to a log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("ratequeue.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}
