//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading `settings.json` or checking the result.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON, or does not fit the settings shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A loaded value is outside what the event log accepts.
    #[error("invalid {key}: {reason}")]
    Invalid {
        /// camelCase path of the offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
