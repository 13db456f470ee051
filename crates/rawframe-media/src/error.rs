//! Error types for decode operations.

use std::path::PathBuf;
use thiserror::Error;

use rawframe_models::MetadataError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing or decoding a clip.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found")]
    BinaryNotFound(String),

    #[error("{program} failed: {message}")]
    ProcessFailed {
        program: String,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{strategy} decode failed: {message}")]
    DecodeFailed {
        strategy: &'static str,
        message: String,
    },

    #[error("Frame {frame} out of range (0-{last})")]
    FrameOutOfRange { frame: u64, last: u64 },

    #[error("Malformed decoder output: {0}")]
    InvalidOutput(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a subprocess failure error.
    pub fn process_failed(
        program: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ProcessFailed {
            program: program.into(),
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a strategy-level decode failure.
    pub fn decode_failed(strategy: &'static str, message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            strategy,
            message: message.into(),
        }
    }

    /// Create a malformed output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<image::ImageError> for MediaError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}
