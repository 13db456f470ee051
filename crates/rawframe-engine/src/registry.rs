//! Clip registry: id → source file → canonical metadata.
//!
//! Source files live flat in one directory and are named after their clip
//! id (`{id}.braw`, `{id}_A001.braw`, ...). Metadata is probed once per
//! id and memoized until the clip is forgotten. Failed probes are not
//! memoized.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use rawframe_media::fs_utils::move_file;
use rawframe_media::{extension_of, try_in_order, MediaError, StrategySelector};
use rawframe_models::{ClipId, ClipMetadata};

use crate::error::{EngineError, EngineResult};
use crate::metrics;

/// A resolved clip and its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ClipInfo {
    pub clip_id: ClipId,
    pub path: PathBuf,
    pub metadata: ClipMetadata,
    /// When the metadata was first probed
    pub registered_at: DateTime<Utc>,
}

/// Resolves clip ids to files and memoizes their metadata.
pub struct ClipRegistry {
    source_dir: PathBuf,
    selector: StrategySelector,
    entries: Mutex<HashMap<ClipId, Arc<OnceCell<ClipInfo>>>>,
}

impl ClipRegistry {
    pub fn new(source_dir: impl Into<PathBuf>, selector: StrategySelector) -> Self {
        Self {
            source_dir: source_dir.into(),
            selector,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    /// Find the source file of `clip_id`.
    ///
    /// Matches `{id}`, `{id}.*` and `{id}_*`; an exact stem match wins over a
    /// prefix match, ties go to the lexically first name.
    pub async fn resolve(&self, clip_id: &ClipId) -> EngineResult<PathBuf> {
        if !clip_id.is_path_safe() {
            return Err(EngineError::not_found(format!("invalid clip id {:?}", clip_id.as_str())));
        }

        let mut dir = match tokio::fs::read_dir(&self.source_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::not_found(clip_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let id = clip_id.as_str();
        let mut best: Option<(bool, String, PathBuf)> = None;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(exact) = match_clip_name(&name, id) else {
                continue;
            };
            // Follows symlinks
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }
            let better = match &best {
                None => true,
                Some((best_exact, best_name, _)) => {
                    (exact && !best_exact) || (exact == *best_exact && name < *best_name)
                }
            };
            if better {
                best = Some((exact, name, entry.path()));
            }
        }

        best.map(|(_, _, path)| path)
            .ok_or_else(|| EngineError::not_found(clip_id.to_string()))
    }

    /// Metadata of `clip_id`, probing on first use.
    ///
    /// Concurrent callers for the same id share one probe.
    pub async fn info(&self, clip_id: &ClipId) -> EngineResult<ClipInfo> {
        let cell = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(clip_id.clone()).or_default())
        };

        if let Some(info) = cell.get() {
            return Ok(info.clone());
        }

        let mut probed = false;
        let result = cell
            .get_or_try_init(|| {
                probed = true;
                self.probe(clip_id)
            })
            .await;
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                if e.is_not_found() {
                    self.release_slot(clip_id, &cell);
                }
                return Err(e);
            }
        };
        if !probed {
            metrics::record_probe_join();
        }
        Ok(info.clone())
    }

    /// Drop an unresolved memo slot so unknown ids don't accumulate.
    fn release_slot(&self, clip_id: &ClipId, cell: &Arc<OnceCell<ClipInfo>>) {
        let mut entries = self.entries.lock();
        let stale = entries
            .get(clip_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && current.get().is_none());
        if stale {
            entries.remove(clip_id);
        }
    }

    pub async fn metadata(&self, clip_id: &ClipId) -> EngineResult<ClipMetadata> {
        Ok(self.info(clip_id).await?.metadata)
    }

    async fn probe(&self, clip_id: &ClipId) -> EngineResult<ClipInfo> {
        let path = self.resolve(clip_id).await?;
        let format = extension_of(&path);
        let strategies = self.selector.strategies_for(&path);

        debug!(clip_id = %clip_id, path = %path.display(), "Probing clip");

        let success = try_in_order(strategies, |strategy| {
            let path = path.clone();
            let format = format.clone();
            async move {
                let probed = strategy.probe(&path).await?;
                ClipMetadata::from_probe(probed, format, strategy.name()).map_err(MediaError::from)
            }
        })
        .await
        .map_err(|exhausted| EngineError::decode(exhausted.last_message()))?;

        let metadata = success.value;
        info!(
            clip_id = %clip_id,
            decoder = success.strategy,
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            frame_count = metadata.frame_count,
            "Clip registered"
        );

        Ok(ClipInfo {
            clip_id: clip_id.clone(),
            path,
            metadata,
            registered_at: Utc::now(),
        })
    }

    /// Move an uploaded file into the source directory as `{id}.{ext}`.
    ///
    /// Any memoized metadata of the id is dropped.
    pub async fn adopt(&self, clip_id: &ClipId, uploaded: &Path) -> EngineResult<PathBuf> {
        if !clip_id.is_path_safe() {
            return Err(EngineError::config(format!(
                "clip id {:?} cannot be used as a file name",
                clip_id.as_str()
            )));
        }

        let ext = extension_of(uploaded);
        let file_name = if ext.is_empty() {
            clip_id.to_string()
        } else {
            format!("{}.{}", clip_id, ext)
        };
        let dest = self.source_dir.join(file_name);

        move_file(uploaded, &dest).await?;
        self.forget(clip_id);

        info!(clip_id = %clip_id, path = %dest.display(), "Adopted uploaded clip");
        Ok(dest)
    }

    /// Drop the memoized metadata of `clip_id`.
    pub fn forget(&self, clip_id: &ClipId) -> bool {
        self.entries.lock().remove(clip_id).is_some()
    }

    /// Ids with a memo slot (probed or being probed).
    pub fn known_clips(&self) -> Vec<ClipId> {
        self.entries.lock().keys().cloned().collect()
    }
}

/// `Some(true)` for an exact stem match, `Some(false)` for a prefix match.
fn match_clip_name(name: &str, id: &str) -> Option<bool> {
    let rest = name.strip_prefix(id)?;
    if rest.is_empty() {
        return Some(true);
    }
    if let Some(ext) = rest.strip_prefix('.') {
        // `{id}.braw` is exact, `{id}.part2.braw` is a prefix match
        return Some(!ext.contains('.'));
    }
    if rest.starts_with('_') {
        return Some(false);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rawframe_media::{DecodeStrategy, DecodedFrame, MediaResult, PixelData};
    use rawframe_models::ProbedMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingProbe {
        probes: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl DecodeStrategy for CountingProbe {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn probe(&self, _path: &Path) -> MediaResult<ProbedMetadata> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(MediaError::decode_failed("counting", "transient"));
            }
            Ok(ProbedMetadata {
                width: Some(1920),
                height: Some(1080),
                fps: Some(24.0),
                fps_rational: None,
                frame_count: Some(240),
                duration: None,
            })
        }

        async fn decode_frame(
            &self,
            _path: &Path,
            _frame_index: u64,
            _fps: f64,
        ) -> MediaResult<DecodedFrame> {
            Ok(DecodedFrame::new(1, 1, PixelData::Rgba(vec![0; 4])))
        }
    }

    fn registry(dir: &TempDir, strategy: Arc<CountingProbe>) -> ClipRegistry {
        let selector = StrategySelector::new().with_fallback(vec![strategy as Arc<dyn DecodeStrategy>]);
        ClipRegistry::new(dir.path(), selector)
    }

    fn counting(fail_first: bool) -> Arc<CountingProbe> {
        Arc::new(CountingProbe {
            probes: AtomicUsize::new(0),
            fail_first,
        })
    }

    #[test]
    fn test_match_clip_name() {
        assert_eq!(match_clip_name("abc.braw", "abc"), Some(true));
        assert_eq!(match_clip_name("abc", "abc"), Some(true));
        assert_eq!(match_clip_name("abc_A001.braw", "abc"), Some(false));
        assert_eq!(match_clip_name("abcd.braw", "abc"), None);
        assert_eq!(match_clip_name("xabc.braw", "abc"), None);
    }

    #[tokio::test]
    async fn test_resolve_prefers_exact_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("clip1_proxy.mov"), b"x").unwrap();
        std::fs::write(dir.path().join("clip1.braw"), b"x").unwrap();
        std::fs::write(dir.path().join("clip10.braw"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("clip2")).unwrap();

        let registry = registry(&dir, counting(false));
        let path = tokio_test::assert_ok!(registry.resolve(&ClipId::from("clip1")).await);
        assert_eq!(path, dir.path().join("clip1.braw"));

        let err = registry.resolve(&ClipId::from("clip2")).await.unwrap_err();
        assert!(err.is_not_found());
        let err = registry.resolve(&ClipId::from("../clip1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_source_dir_is_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = ClipRegistry::new(dir.path().join("absent"), StrategySelector::new());
        let err = registry.metadata(&ClipId::from("nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_slots() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("c.braw"), b"x").unwrap();
        let registry = registry(&dir, counting(false));

        for i in 0..16 {
            let err = registry.info(&ClipId::from(format!("ghost{}", i))).await.unwrap_err();
            assert!(err.is_not_found());
        }
        assert!(registry.known_clips().is_empty());

        registry.info(&ClipId::from("c")).await.unwrap();
        assert_eq!(registry.known_clips(), vec![ClipId::from("c")]);
    }

    #[tokio::test]
    async fn test_concurrent_metadata_probes_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("c.braw"), b"x").unwrap();
        let strategy = counting(false);
        let registry = Arc::new(registry(&dir, Arc::clone(&strategy)));

        let calls = (0..8).map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.metadata(&ClipId::from("c")).await })
        });
        for result in futures::future::join_all(calls).await {
            let metadata = result.unwrap().unwrap();
            assert_eq!(metadata.frame_count, 240);
            assert_eq!(metadata.decoder, "counting");
            assert_eq!(metadata.format, "braw");
        }
        assert_eq!(strategy.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_is_retried() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("c.mov"), b"x").unwrap();
        let strategy = counting(true);
        let registry = registry(&dir, Arc::clone(&strategy));

        let err = registry.metadata(&ClipId::from("c")).await.unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
        assert!(registry.metadata(&ClipId::from("c")).await.is_ok());
        assert_eq!(strategy.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_adopt_and_forget() {
        let dir = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();
        let upload = uploads.path().join("upload-123.BRAW");
        std::fs::write(&upload, b"payload").unwrap();

        let strategy = counting(false);
        let registry = registry(&dir, Arc::clone(&strategy));
        let id = ClipId::from("fresh");

        let dest = registry.adopt(&id, &upload).await.unwrap();
        assert_eq!(dest, dir.path().join("fresh.braw"));
        assert!(!upload.exists());

        registry.metadata(&id).await.unwrap();
        assert!(registry.forget(&id));
        assert!(!registry.forget(&id));
        registry.metadata(&id).await.unwrap();
        assert_eq!(strategy.probes.load(Ordering::SeqCst), 2);
    }
}
