//! Engine error types.

use thiserror::Error;

use rawframe_media::{ChainExhausted, MediaError, StrategyAttempt};
use rawframe_models::MetadataError;
use rawframe_storage::StorageError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the frame service.
///
/// Payloads are strings so the value can be cloned to every caller waiting
/// on a shared decode.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Clip not found: {0}")]
    NotFound(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Frame index out of range: {0}")]
    FrameIndexOutOfRange(String),

    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    #[error("Extraction failed after {} attempt(s): {last}", attempts.len())]
    Extraction {
        attempts: Vec<StrategyAttempt>,
        last: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the clip itself is unknown (as opposed to undecodable).
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::Decode(_) => "decode",
            EngineError::FrameIndexOutOfRange(_) => "frame_index_out_of_range",
            EngineError::CacheIo(_) => "cache_io",
            EngineError::Extraction { .. } => "extraction",
            EngineError::Config(_) => "config",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<MediaError> for EngineError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::FileNotFound(path) => Self::NotFound(path.display().to_string()),
            MediaError::FrameOutOfRange { .. } => Self::FrameIndexOutOfRange(e.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<MetadataError> for EngineError {
    fn from(e: MetadataError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        Self::CacheIo(e.to_string())
    }
}

impl From<ChainExhausted> for EngineError {
    fn from(e: ChainExhausted) -> Self {
        Self::Extraction {
            last: e.last_message(),
            attempts: e.attempts,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
