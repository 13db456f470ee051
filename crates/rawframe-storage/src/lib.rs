//! Two-tier frame cache.
//!
//! This crate provides:
//! - An in-process LRU tier bounded by bytes
//! - An on-disk LRU tier with a persisted recency index
//! - `FrameCache`, which layers the two with promotion and statistics

pub mod cache;
pub mod disk;
pub mod error;
pub mod frame;
pub mod memory;

pub use cache::{FrameCache, FrameCacheConfig, SetOutcome};
pub use disk::DiskTier;
pub use error::{StorageError, StorageResult};
pub use frame::CachedFrame;
pub use memory::MemoryTier;
