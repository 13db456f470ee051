//! Clip disposal.

use serde::Serialize;
use std::sync::Arc;
use tracing::{warn, Instrument};

use rawframe_models::ClipId;
use rawframe_storage::FrameCache;

use crate::error::EngineResult;
use crate::extractor::ExtractionCoordinator;
use crate::logging::ClipLogger;
use crate::registry::ClipRegistry;

/// What a disposal removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisposeReport {
    pub source_deleted: bool,
    pub cache_entries_removed: usize,
}

/// Tears down everything the engine holds for a clip.
pub struct LifecycleManager {
    registry: Arc<ClipRegistry>,
    cache: Arc<FrameCache>,
    extractor: Arc<ExtractionCoordinator>,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<ClipRegistry>,
        cache: Arc<FrameCache>,
        extractor: Arc<ExtractionCoordinator>,
    ) -> Self {
        Self {
            registry,
            cache,
            extractor,
        }
    }

    /// Delete the clip's source file and cached frames, and forget its
    /// metadata and decode lock.
    ///
    /// Unknown or already disposed ids are a no-op.
    pub async fn dispose(&self, clip_id: &ClipId) -> EngineResult<DisposeReport> {
        let logger = ClipLogger::new(clip_id, "cleanup");
        let span = logger.create_span();
        self.dispose_inner(clip_id, &logger).instrument(span).await
    }

    async fn dispose_inner(
        &self,
        clip_id: &ClipId,
        logger: &ClipLogger,
    ) -> EngineResult<DisposeReport> {
        let mut report = DisposeReport::default();

        self.extractor.forget_clip(clip_id);
        self.registry.forget(clip_id);

        match self.registry.resolve(clip_id).await {
            Ok(path) => match tokio::fs::remove_file(&path).await {
                Ok(()) => report.source_deleted = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete source clip");
                    return Err(e.into());
                }
            },
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        report.cache_entries_removed = self.cache.clear_for_clip(clip_id).await;

        if report.source_deleted || report.cache_entries_removed > 0 {
            logger.log_completion(&format!(
                "source deleted: {}, {} cache entries removed",
                report.source_deleted, report.cache_entries_removed
            ));
        }
        Ok(report)
    }
}
