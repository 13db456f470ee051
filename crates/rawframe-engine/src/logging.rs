//! Structured clip logging utilities.
//!
//! Gives every log line of a clip operation the same `clip_id` and
//! `operation` fields.

use tracing::{error, info, warn, Span};

use rawframe_models::ClipId;

/// Clip logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct ClipLogger {
    clip_id: String,
    operation: String,
}

impl ClipLogger {
    /// Create a new logger for a clip and operation
    /// (e.g. "extract_frame", "cleanup").
    pub fn new(clip_id: &ClipId, operation: &str) -> Self {
        Self {
            clip_id: clip_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip operation started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip operation progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip operation warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip operation error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip operation completed: {}", message
        );
    }

    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this clip operation.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "clip",
            clip_id = %self.clip_id,
            operation = %self.operation
        )
    }
}
