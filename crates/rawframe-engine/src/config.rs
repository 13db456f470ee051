//! Engine configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rawframe_media::SelectorConfig;
use rawframe_storage::FrameCacheConfig;

use crate::error::{EngineError, EngineResult};
use crate::extractor::DEFAULT_BATCH_CONCURRENCY;

const MB: u64 = 1024 * 1024;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Disk cache directory
    pub cache_dir: PathBuf,
    /// Directory holding uploaded source clips
    pub source_dir: PathBuf,
    /// Scratch directory for helper output files
    pub scratch_dir: PathBuf,
    /// Memory tier capacity in MB
    pub memory_cache_mb: u64,
    /// Disk tier capacity in MB
    pub disk_cache_mb: u64,
    /// Maximum concurrent extractions per batch
    pub batch_concurrency: usize,
    /// Per-call decoder timeout
    pub decode_timeout: Duration,
    /// Helper extractor binary; the helper strategy is disabled when unset
    pub helper_bin: Option<PathBuf>,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub raw_still_bin: PathBuf,
    /// Vendor SDK library directory
    pub sdk_lib_path: PathBuf,
    /// Prometheus listen address; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/tmp/rawframe/cache"),
            source_dir: PathBuf::from("/tmp/rawframe/uploads"),
            scratch_dir: PathBuf::from("/tmp/rawframe/scratch"),
            memory_cache_mb: 500,
            disk_cache_mb: 5000,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            decode_timeout: Duration::from_secs(120),
            helper_bin: None,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            raw_still_bin: PathBuf::from("dcraw"),
            sdk_lib_path: PathBuf::from("/usr/local/lib"),
            metrics_addr: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            cache_dir: std::env::var("RAWFRAME_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/rawframe/cache")),
            source_dir: std::env::var("RAWFRAME_SOURCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/rawframe/uploads")),
            scratch_dir: std::env::var("RAWFRAME_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/rawframe/scratch")),
            memory_cache_mb: std::env::var("RAWFRAME_MEMORY_CACHE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),
            disk_cache_mb: std::env::var("RAWFRAME_DISK_CACHE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            batch_concurrency: std::env::var("RAWFRAME_BATCH_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_CONCURRENCY),
            decode_timeout: Duration::from_secs(
                std::env::var("RAWFRAME_DECODE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            helper_bin: std::env::var("RAWFRAME_HELPER_BIN")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            ffmpeg_bin: std::env::var("RAWFRAME_FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            ffprobe_bin: std::env::var("RAWFRAME_FFPROBE_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            raw_still_bin: std::env::var("RAWFRAME_RAW_STILL_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dcraw")),
            sdk_lib_path: std::env::var("RAWFRAME_SDK_LIB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/usr/local/lib")),
            metrics_addr: std::env::var("RAWFRAME_METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.memory_cache_mb == 0 {
            return Err(EngineError::config("memory cache capacity must be > 0"));
        }
        if self.disk_cache_mb == 0 {
            return Err(EngineError::config("disk cache capacity must be > 0"));
        }
        if self.batch_concurrency == 0 {
            return Err(EngineError::config("batch concurrency must be > 0"));
        }
        if self.decode_timeout.is_zero() {
            return Err(EngineError::config("decode timeout must be > 0"));
        }
        Ok(())
    }

    pub fn frame_cache_config(&self) -> FrameCacheConfig {
        FrameCacheConfig {
            dir: self.cache_dir.clone(),
            memory_capacity_bytes: self.memory_cache_mb * MB,
            disk_capacity_bytes: self.disk_cache_mb * MB,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            helper_bin: self.helper_bin.clone(),
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            ffprobe_bin: self.ffprobe_bin.clone(),
            raw_still_bin: self.raw_still_bin.clone(),
            sdk_lib_path: Some(self.sdk_lib_path.clone()),
            scratch_dir: self.scratch_dir.clone(),
            decode_timeout: self.decode_timeout,
        }
    }
}
