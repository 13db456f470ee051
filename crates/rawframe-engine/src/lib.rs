//! Frame extraction engine.
//!
//! This crate provides:
//! - Clip registry with single-flight metadata probing
//! - Extraction coordinator with per-key single-flight decodes
//! - Clip disposal
//! - The `FrameService` facade, configuration, metrics and logging helpers

pub mod config;
pub mod error;
pub mod extractor;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod service;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use extractor::{ExtractionCoordinator, FrameData, DEFAULT_BATCH_CONCURRENCY};
pub use lifecycle::{DisposeReport, LifecycleManager};
pub use logging::ClipLogger;
pub use registry::{ClipInfo, ClipRegistry};
pub use service::FrameService;
