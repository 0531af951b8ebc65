//! Error types for docrelay.

use std::path::PathBuf;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Per-document processing errors.
///
/// Every variant is caught at the pipeline boundary and converted into a
/// routing decision plus a statistics increment; none of these abort the
/// watch loop. Address rejections are not errors; they are
/// [`Verdict::Rejected`](crate::validate::Verdict) values.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Document unreadable: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Dispatch to {recipient} failed: {reason}")]
    Dispatch { recipient: String, reason: String },

    #[error("Failed to move {path} into {dest}: {source}")]
    Route {
        path: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unclassified processing error: {0}")]
    Other(String),
}

/// Folder-watch errors.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to start watcher: {0}")]
    StartupFailed(String),

    #[error("Failed to watch directory {path}: {reason}")]
    WatchFailed { path: PathBuf, reason: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
