//! Shared data models for the rawframe frame cache.
//!
//! This crate provides Serde-serializable types for:
//! - Clip identity and canonical clip metadata
//! - Quality tiers and output representations
//! - Deterministic frame cache keys
//! - Cache statistics snapshots
//! - Timestamp parsing and frame index mapping

pub mod cache_key;
pub mod clip;
pub mod quality;
pub mod stats;
pub mod timestamp;

// Re-export common types
pub use cache_key::CacheKey;
pub use clip::{frame_index_for, ClipId, ClipMetadata, FrameRate, MetadataError, ProbedMetadata};
pub use quality::{OutputFormat, OutputFormatParseError, Quality, QualityParseError};
pub use stats::CacheStatistics;
pub use timestamp::{parse_timestamp, TimestampError, TimestampKey};
