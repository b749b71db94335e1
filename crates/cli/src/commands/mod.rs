//! CLI subcommand implementations.

pub mod sitemap;
pub mod storage;

use std::io::Write;
use std::path::Path;

use atelier_storefront::backend::BackendError;
use atelier_storefront::config::ConfigError;
use atelier_storefront::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in namespace {namespace}: {source}")]
    Json {
        namespace: String,
        source: serde_json::Error,
    },

    #[error("Unknown namespace '{0}' (expected one of: {1})")]
    UnknownNamespace(String, String),
}

/// Write to `out`, or stdout when no path is given.
///
/// # Errors
///
/// Returns an error if the file or stdout cannot be written.
pub fn write_output(out: Option<&Path>, contents: &str) -> Result<(), CommandError> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            tracing::info!(path = %path.display(), bytes = contents.len(), "Wrote file");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(contents.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
