//! Frame extraction with per-key single-flight and bounded batch fan-out.
//!
//! A cache miss makes the first caller the leader for that key: it spawns
//! the decode as a detached task and publishes a shared handle in the
//! in-flight map. Later callers for the same key await the same handle.
//! Dropping a caller never cancels the task; the slot is released when the
//! task ends, including by panic.
//!
//! Requests pin the disposal generation of their clip before resolving it,
//! so a decode that started before a disposal never leaves frames in the
//! cache afterwards.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use rawframe_media::{render_frame, try_in_order, DecodeStrategy, MediaError};
use rawframe_models::{CacheKey, ClipId, OutputFormat, Quality, TimestampKey};
use rawframe_storage::{CachedFrame, FrameCache};

use crate::error::{EngineError, EngineResult};
use crate::logging::ClipLogger;
use crate::metrics;
use crate::registry::ClipRegistry;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Encoded frame returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct FrameData {
    #[serde(skip)]
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub timestamp: f64,
    pub frame_index: u64,
    /// Served from the frame cache
    pub cached: bool,
}

type SharedExtraction = Shared<BoxFuture<'static, EngineResult<FrameData>>>;
type InflightMap = Arc<Mutex<HashMap<CacheKey, SharedExtraction>>>;

/// Releases an in-flight slot when the decode task ends.
struct InflightSlot {
    inflight: InflightMap,
    key: CacheKey,
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        self.inflight.lock().remove(&self.key);
    }
}

#[derive(Default)]
struct GenerationState {
    generation: u64,
    /// Requests and decodes currently holding a guard
    active: usize,
}

type GenerationMap = Arc<Mutex<HashMap<ClipId, GenerationState>>>;

/// Pins the disposal generation of a clip while a request or decode is
/// using it. The clip's entry lives only as long as some guard does.
struct GenerationGuard {
    generations: GenerationMap,
    clip_id: ClipId,
    generation: u64,
}

impl GenerationGuard {
    fn enter(generations: &GenerationMap, clip_id: &ClipId) -> Self {
        let generation = {
            let mut map = generations.lock();
            let state = map.entry(clip_id.clone()).or_default();
            state.active += 1;
            state.generation
        };
        Self {
            generations: Arc::clone(generations),
            clip_id: clip_id.clone(),
            generation,
        }
    }

    /// Second guard on the same generation, for the detached decode task.
    fn retain(&self) -> Self {
        if let Some(state) = self.generations.lock().get_mut(&self.clip_id) {
            state.active += 1;
        }
        Self {
            generations: Arc::clone(&self.generations),
            clip_id: self.clip_id.clone(),
            generation: self.generation,
        }
    }

    /// False once the clip was disposed after this guard was taken.
    fn is_current(&self) -> bool {
        self.generations
            .lock()
            .get(&self.clip_id)
            .is_some_and(|state| state.generation == self.generation)
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        let mut map = self.generations.lock();
        if let Some(state) = map.get_mut(&self.clip_id) {
            state.active = state.active.saturating_sub(1);
            if state.active == 0 {
                map.remove(&self.clip_id);
            }
        }
    }
}

/// Everything a detached decode task needs.
struct DecodeJob {
    clip_id: ClipId,
    path: PathBuf,
    fps: f64,
    frame_index: u64,
    timestamp: f64,
    quality: Quality,
    format: OutputFormat,
    key: CacheKey,
    strategies: Vec<Arc<dyn DecodeStrategy>>,
    clip_lock: Arc<tokio::sync::Mutex<()>>,
    generation: GenerationGuard,
}

pub struct ExtractionCoordinator {
    registry: Arc<ClipRegistry>,
    cache: Arc<FrameCache>,
    inflight: InflightMap,
    /// Serializes decodes of one clip for strategies without concurrent reads
    clip_locks: Mutex<HashMap<ClipId, Arc<tokio::sync::Mutex<()>>>>,
    /// Disposal generations of clips with requests in progress
    generations: GenerationMap,
    batch_concurrency: usize,
}

impl ExtractionCoordinator {
    pub fn new(
        registry: Arc<ClipRegistry>,
        cache: Arc<FrameCache>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            cache,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            clip_locks: Mutex::new(HashMap::new()),
            generations: Arc::new(Mutex::new(HashMap::new())),
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Extract one frame, from cache when possible.
    pub async fn extract_frame(
        &self,
        clip_id: &ClipId,
        timestamp: f64,
        quality: Quality,
        format: OutputFormat,
    ) -> EngineResult<FrameData> {
        let generation = GenerationGuard::enter(&self.generations, clip_id);
        let info = self.registry.info(clip_id).await?;
        let frame_index = info.metadata.frame_index(timestamp).ok_or_else(|| {
            EngineError::FrameIndexOutOfRange(format!("clip {} has no frames", clip_id))
        })?;
        let key = CacheKey::for_frame(clip_id, timestamp, quality, format);

        if let Some(frame) = self.cache.get(&key).await {
            metrics::record_cache_hit();
            return Ok(cached_frame(frame, format, timestamp, frame_index));
        }
        metrics::record_cache_miss();

        let shared = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(existing) => {
                    metrics::record_inflight_join();
                    debug!(clip_id = %clip_id, key = %key, "Joining in-flight decode");
                    existing.clone()
                }
                None => {
                    // A leader may have finished between the lookup above and
                    // taking the lock; its frame is in memory by now.
                    if let Some(frame) = self.cache.peek_memory(&key) {
                        debug!(clip_id = %clip_id, key = %key, "Decode finished before join");
                        return Ok(cached_frame(frame, format, timestamp, frame_index));
                    }
                    let job = DecodeJob {
                        clip_id: info.clip_id.clone(),
                        path: info.path.clone(),
                        fps: info.metadata.fps,
                        frame_index,
                        timestamp,
                        quality,
                        format,
                        key: key.clone(),
                        strategies: self.registry.selector().strategies_for(&info.path).to_vec(),
                        clip_lock: self.clip_lock(&info.clip_id),
                        generation: generation.retain(),
                    };
                    let shared = self.spawn_decode(job);
                    inflight.insert(key, shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Extract many frames of one clip.
    ///
    /// At most `batch_concurrency` frames are extracted at once. Frames that
    /// fail are logged and left out of the result; clip-level failures
    /// (unknown clip, unreadable metadata) fail the whole batch.
    pub async fn extract_frames(
        &self,
        clip_id: &ClipId,
        timestamps: &[f64],
        quality: Quality,
        format: OutputFormat,
    ) -> EngineResult<BTreeMap<TimestampKey, FrameData>> {
        let logger = ClipLogger::new(clip_id, "extract_frames");
        self.registry.info(clip_id).await?;

        let mut unique: Vec<TimestampKey> = timestamps.iter().copied().map(TimestampKey).collect();
        unique.sort();
        unique.dedup();
        logger.log_start(&format!("{} timestamp(s), quality {}", unique.len(), quality));

        let semaphore = Semaphore::new(self.batch_concurrency);
        let tasks = unique.into_iter().map(|ts| {
            let semaphore = &semaphore;
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (ts, Err(EngineError::internal("batch semaphore closed"))),
                };
                (ts, self.extract_frame(clip_id, ts.seconds(), quality, format).await)
            }
        });

        let mut frames = BTreeMap::new();
        let mut failed = 0usize;
        for (ts, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(frame) => {
                    frames.insert(ts, frame);
                }
                Err(e) => {
                    failed += 1;
                    logger.log_warning(&format!("frame at {}s failed: {}", ts, e));
                }
            }
        }

        logger.log_completion(&format!("{} extracted, {} failed", frames.len(), failed));
        Ok(frames)
    }

    /// Drop per-clip decode state and invalidate decodes still running.
    pub fn forget_clip(&self, clip_id: &ClipId) {
        self.clip_locks.lock().remove(clip_id);
        if let Some(state) = self.generations.lock().get_mut(clip_id) {
            state.generation += 1;
        }
    }

    /// Number of decodes currently running.
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }

    fn clip_lock(&self, clip_id: &ClipId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.clip_locks.lock().entry(clip_id.clone()).or_default())
    }

    /// Spawn the decode task. Must be called with the in-flight map locked
    /// so the task cannot release its slot before it is published.
    fn spawn_decode(&self, job: DecodeJob) -> SharedExtraction {
        let slot = InflightSlot {
            inflight: Arc::clone(&self.inflight),
            key: job.key.clone(),
        };
        let cache = Arc::clone(&self.cache);

        let handle = tokio::spawn(async move {
            let _slot = slot;
            run_decode(job, cache).await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::internal(format!("decode task failed: {}", e))),
            }
        }
        .boxed()
        .shared()
    }
}

fn cached_frame(frame: CachedFrame, format: OutputFormat, timestamp: f64, frame_index: u64) -> FrameData {
    FrameData {
        bytes: frame.data,
        width: frame.width,
        height: frame.height,
        format,
        timestamp,
        frame_index,
        cached: true,
    }
}

async fn run_decode(job: DecodeJob, cache: Arc<FrameCache>) -> EngineResult<FrameData> {
    let started = Instant::now();
    let DecodeJob {
        clip_id,
        path,
        fps,
        frame_index,
        timestamp,
        quality,
        format,
        key,
        strategies,
        clip_lock,
        generation,
    } = job;

    debug!(clip_id = %clip_id, key = %key, frame_index, "Decoding frame");

    let result = try_in_order(&strategies, |strategy| {
        let path = path.clone();
        let clip_lock = Arc::clone(&clip_lock);
        async move {
            let name = strategy.name();
            let decoded = {
                let _serial = if strategy.supports_concurrent_reads() {
                    None
                } else {
                    Some(clip_lock.lock().await)
                };
                strategy.decode_frame(&path, frame_index, fps).await
            };
            let rendered = match decoded {
                Ok(decoded) => tokio::task::spawn_blocking(move || {
                    render_frame(decoded, quality, format)
                })
                .await
                .map_err(|e| MediaError::internal(format!("render task failed: {}", e)))
                .and_then(|r| r),
                Err(e) => Err(e),
            };
            metrics::record_decode_attempt(
                name,
                if rendered.is_ok() { "success" } else { "failure" },
            );
            rendered
        }
    })
    .await;

    let success = match result {
        Ok(success) => success,
        Err(exhausted) => {
            let err = EngineError::from(exhausted);
            warn!(clip_id = %clip_id, key = %key, error = %err, "All decode strategies failed");
            metrics::record_extraction_failure(err.kind());
            return Err(err);
        }
    };

    let rendered = success.value;
    let bytes = Bytes::from(rendered.bytes);
    let outcome = cache
        .set(
            &key,
            CachedFrame::new(bytes.clone(), rendered.width, rendered.height),
        )
        .await;
    metrics::record_cache_evictions(outcome.evicted);

    // The clip was disposed while decoding; don't leave its frames behind
    if !generation.is_current() {
        cache.clear_for_clip(&clip_id).await;
    }

    metrics::record_decode_duration(success.strategy, started.elapsed().as_secs_f64());
    debug!(
        clip_id = %clip_id,
        key = %key,
        strategy = success.strategy,
        fallbacks = success.failed.len(),
        bytes = bytes.len(),
        "Frame decoded"
    );

    Ok(FrameData {
        bytes,
        width: rendered.width,
        height: rendered.height,
        format,
        timestamp,
        frame_index,
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generations() -> GenerationMap {
        Arc::new(Mutex::new(HashMap::new()))
    }

    #[test]
    fn test_disposal_invalidates_pinned_generation() {
        let map = generations();
        let clip = ClipId::from("c");

        let request = GenerationGuard::enter(&map, &clip);
        let decode = request.retain();
        drop(request);
        assert!(decode.is_current());

        // What forget_clip does while the decode is still running
        map.lock().get_mut(&clip).unwrap().generation += 1;
        assert!(!decode.is_current());

        let later = GenerationGuard::enter(&map, &clip);
        assert!(later.is_current());
        assert_eq!(later.generation, 1);
    }

    #[test]
    fn test_generations_pruned_when_idle() {
        let map = generations();
        for i in 0..32 {
            let guard = GenerationGuard::enter(&map, &ClipId::from(format!("clip{}", i)));
            let retained = guard.retain();
            drop(guard);
            drop(retained);
        }
        assert!(map.lock().is_empty());
    }
}
