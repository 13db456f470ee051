//! Public entry point of the frame engine.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use rawframe_media::{check_binary, BrawSdk, StrategySelector};
use rawframe_models::{CacheStatistics, ClipId, OutputFormat, Quality, TimestampKey};
use rawframe_storage::FrameCache;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::extractor::{ExtractionCoordinator, FrameData};
use crate::lifecycle::{DisposeReport, LifecycleManager};
use crate::metrics;
use crate::registry::{ClipInfo, ClipRegistry};

/// Frame service: registry, cache, extraction and cleanup behind one handle.
///
/// Share it with `Arc<FrameService>`; every method takes `&self`.
pub struct FrameService {
    config: EngineConfig,
    registry: Arc<ClipRegistry>,
    cache: Arc<FrameCache>,
    extractor: Arc<ExtractionCoordinator>,
    lifecycle: LifecycleManager,
}

impl FrameService {
    /// Build the service with the standard strategy chains.
    ///
    /// `sdk` is the native SDK binding, when one is linked in.
    pub async fn initialize(
        config: EngineConfig,
        sdk: Option<Arc<dyn BrawSdk>>,
    ) -> EngineResult<Self> {
        config.validate()?;
        for (name, bin) in [
            ("ffmpeg", &config.ffmpeg_bin),
            ("ffprobe", &config.ffprobe_bin),
            ("raw_still", &config.raw_still_bin),
        ] {
            if let Err(e) = check_binary(bin) {
                warn!(binary = name, error = %e, "Decoder binary unavailable, its strategy will fail");
            }
        }
        let selector = StrategySelector::from_config(&config.selector_config(), sdk);
        Self::with_selector(config, selector).await
    }

    /// Build the service with an explicit strategy selector.
    pub async fn with_selector(
        config: EngineConfig,
        selector: StrategySelector,
    ) -> EngineResult<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.source_dir)
            .await
            .map_err(|e| {
                EngineError::config(format!(
                    "cannot create source dir {}: {}",
                    config.source_dir.display(),
                    e
                ))
            })?;

        let cache = Arc::new(FrameCache::open(config.frame_cache_config()).await?);
        let registry = Arc::new(ClipRegistry::new(&config.source_dir, selector));
        let extractor = Arc::new(ExtractionCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            config.batch_concurrency,
        ));
        let lifecycle = LifecycleManager::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&extractor),
        );

        let stats = cache.stats();
        info!(
            source_dir = %config.source_dir.display(),
            cache_dir = %config.cache_dir.display(),
            disk_entries = stats.disk_entries,
            disk_bytes = stats.disk_bytes,
            "Frame service initialized"
        );

        Ok(Self {
            config,
            registry,
            cache,
            extractor,
            lifecycle,
        })
    }

    /// Persist cache bookkeeping. Decodes still running are not waited for.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let inflight = self.extractor.inflight_count();
        if inflight > 0 {
            warn!(inflight, "Shutting down with decodes in flight");
        }
        self.cache.flush().await?;
        info!("Frame service shut down");
        Ok(())
    }

    /// Take ownership of an uploaded file and probe it.
    pub async fn register_upload(&self, clip_id: &ClipId, uploaded: &Path) -> EngineResult<ClipInfo> {
        self.registry.adopt(clip_id, uploaded).await?;
        self.registry.info(clip_id).await
    }

    pub async fn get_info(&self, clip_id: &ClipId) -> EngineResult<ClipInfo> {
        self.registry.info(clip_id).await
    }

    pub async fn extract_frame(
        &self,
        clip_id: &ClipId,
        timestamp: f64,
        quality: Quality,
        format: OutputFormat,
    ) -> EngineResult<FrameData> {
        self.extractor
            .extract_frame(clip_id, timestamp, quality, format)
            .await
    }

    pub async fn extract_frames(
        &self,
        clip_id: &ClipId,
        timestamps: &[f64],
        quality: Quality,
        format: OutputFormat,
    ) -> EngineResult<BTreeMap<TimestampKey, FrameData>> {
        self.extractor
            .extract_frames(clip_id, timestamps, quality, format)
            .await
    }

    /// Dispose of a clip. Idempotent.
    pub async fn cleanup(&self, clip_id: &ClipId) -> EngineResult<DisposeReport> {
        self.lifecycle.dispose(clip_id).await
    }

    pub fn get_cache_stats(&self) -> CacheStatistics {
        let stats = self.cache.stats();
        metrics::record_cache_usage(stats.memory_bytes, stats.disk_bytes);
        stats
    }

    /// Empty the frame cache, optionally zeroing the counters.
    pub async fn clear_cache(&self, reset_stats: bool) -> EngineResult<()> {
        self.cache.clear_all(reset_stats).await?;
        info!(reset_stats, "Frame cache cleared");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
