//! Error types for Flarelog
//!
//! This module defines all error types used throughout the library,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Flarelog operations
///
/// This enum encompasses all possible errors that can occur while
/// loading, persisting, renaming, and exporting transcripts, and while
/// driving the title-generation provider.
///
/// Parse warnings (unrecognized message blocks, unparseable settings
/// comments) are deliberately not represented here: they are logged via
/// `tracing` and never fail an operation.
#[derive(Error, Debug)]
pub enum FlarelogError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document does not open with a parseable frontmatter block
    #[error("Malformed document '{path}': {reason}")]
    MalformedDocument {
        /// Path of the offending document
        path: String,
        /// What was wrong with the header
        reason: String,
    },

    /// A file collaborator call failed during a persistence operation
    ///
    /// The transcript's dirty flag is left set when this is returned from
    /// a save, so the caller can retry.
    #[error("Persistence failure during {operation} on '{path}': {message}")]
    Persistence {
        /// Operation that failed (create, read, modify, rename, ...)
        operation: String,
        /// Path involved in the failed call
        path: String,
        /// Underlying failure description
        message: String,
    },

    /// The title provider exhausted its retries
    #[error("Title generation failed after {attempts} attempts: {message}")]
    TitleGenerationFailed {
        /// Number of attempts made before giving up
        attempts: u32,
        /// Last provider error observed
        message: String,
    },

    /// The rename step of the title transaction failed
    ///
    /// The in-memory title and on-disk frontmatter have already been
    /// rolled back to their pre-transaction values when this is returned.
    #[error("Rename failed from '{from}' to '{to}': {message}")]
    RenameFailed {
        /// Path before the attempted rename
        from: String,
        /// Path the rename targeted
        to: String,
        /// Underlying failure description
        message: String,
    },

    /// Provider-related errors (single-shot completion calls)
    #[error("Provider error: {0}")]
    Provider(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Flarelog operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
