//! Error types for setforge

use std::path::PathBuf;
use thiserror::Error;

/// Result type for packaging and install operations
pub type SetupResult<T> = Result<T, SetupError>;

/// Errors that can occur while building or running an installer
#[derive(Error, Debug)]
pub enum SetupError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid manifest file
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Source root not found
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),

    /// A file glob matched nothing
    #[error("No files matched pattern: {0}")]
    NoFilesMatched(String),

    /// File collection error
    #[error("Collect error: {0}")]
    Collect(String),

    /// Payload format error
    #[error("Invalid payload format: {0}")]
    InvalidPayload(String),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Icon processing error
    #[error("Icon error: {0}")]
    Icon(String),

    /// Build-time error
    #[error("Build error: {0}")]
    Build(String),

    /// Install-time error
    #[error("Install error: {0}")]
    Install(String),

    /// Shortcut creation or removal error
    #[error("Shortcut error: {0}")]
    Shortcut(String),

    /// Install receipt error
    #[error("Receipt error: {0}")]
    Receipt(String),

    /// Machine architecture not supported by this package
    #[error("Unsupported architecture: this package supports [{supported}], machine is {actual}")]
    UnsupportedArch { supported: String, actual: String },

    /// Uninstall error
    #[error("Uninstall error: {0}")]
    Uninstall(String),
}
