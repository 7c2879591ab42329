//! Error handling for Retake
//!
//! Failures in this layer are never fatal: storage and conversion errors
//! degrade to a no-op plus a reported condition, and expected user-driven
//! edge cases (deleting the last version, switching past the end of the
//! version list) are rejected with boolean returns at the operation
//! boundary rather than surfaced as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Retake operations
pub type Result<T> = std::result::Result<T, RetakeError>;

/// Main error type for Retake operations
#[derive(Error, Debug)]
pub enum RetakeError {
    // Storage errors
    #[error("Version not found in store: {handle}")]
    VersionNotFound { handle: String },

    #[error("Failed to read {path}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Session errors
    #[error("Invalid sample range [{start}, {end}) for buffer of {total} samples")]
    InvalidRange {
        start: usize,
        end: usize,
        total: usize,
    },

    #[error("Selected range is too short: {len} samples (minimum {min})")]
    RangeTooShort { len: usize, min: usize },

    #[error("No part with id {id}")]
    PartNotFound { id: String },

    // Conversion errors
    #[error("Conversion failed: {reason}")]
    ConversionFailed { reason: String },

    #[error("Conversion produced no usable audio")]
    EmptyConversion,

    // Project persistence
    #[error("Project manifest not found: {path}")]
    ProjectNotFound { path: PathBuf },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // WAV codec errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl RetakeError {
    /// Whether the session can continue after this error with state intact.
    ///
    /// Everything except raw I/O and serialization failures leaves the
    /// in-memory part set untouched.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RetakeError::Io(_) | RetakeError::Serialization(_) | RetakeError::Wav(_)
        )
    }
}
