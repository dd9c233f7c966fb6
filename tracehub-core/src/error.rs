//! Error types for tracehub-core

use thiserror::Error;

/// Main error type for the tracehub-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error reading or watching a trace file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A parser reported a fatal error (not an individual bad line)
    #[error("parse error in {agent} parser: {message}")]
    Parse { agent: String, message: String },

    /// Invalid glob pattern in a source profile
    #[error("invalid glob pattern {pattern:?}: {message}")]
    Glob { pattern: String, message: String },

    /// Regex compile failure in the redactor (caller should fall back)
    #[error("regex compile error: {0}")]
    Regex(#[from] regex::Error),

    /// Filesystem watch setup failure
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Trace referenced by id does not exist in the index
    #[error("trace not found: {0}")]
    TraceNotFound(String),

    /// Configuration value is invalid
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for tracehub-core
pub type Result<T> = std::result::Result<T, Error>;
