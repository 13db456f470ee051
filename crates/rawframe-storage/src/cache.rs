//! Memory + disk frame cache with promotion and statistics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use rawframe_models::{CacheKey, CacheStatistics, ClipId};

use crate::disk::DiskTier;
use crate::error::StorageResult;
use crate::frame::CachedFrame;
use crate::memory::MemoryTier;

const MB: u64 = 1024 * 1024;

/// Frame cache configuration.
#[derive(Debug, Clone)]
pub struct FrameCacheConfig {
    /// Directory for the disk tier
    pub dir: PathBuf,
    /// Memory tier capacity in bytes
    pub memory_capacity_bytes: u64,
    /// Disk tier capacity in bytes
    pub disk_capacity_bytes: u64,
}

impl Default for FrameCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/rawframe/cache"),
            memory_capacity_bytes: 500 * MB,
            disk_capacity_bytes: 5000 * MB,
        }
    }
}

/// What a `set` did, for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// Entries evicted from either tier
    pub evicted: u64,
    /// Whether the disk write succeeded
    pub stored_on_disk: bool,
}

/// Two-tier LRU frame cache.
pub struct FrameCache {
    memory: MemoryTier,
    disk: DiskTier,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl FrameCache {
    /// Open the cache, preparing the disk tier.
    pub async fn open(config: FrameCacheConfig) -> StorageResult<Self> {
        let disk = DiskTier::open(&config.dir, config.disk_capacity_bytes).await?;
        Ok(Self {
            memory: MemoryTier::new(config.memory_capacity_bytes),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Look up `key`: memory first, then disk (promoting hits into memory).
    ///
    /// Disk read errors are logged and count as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedFrame> {
        if let Some(frame) = self.memory.get(key.as_str()) {
            // Memory hits count as disk accesses too
            self.disk.touch(key.as_str());
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, tier = "memory", "Cache hit");
            return Some(frame);
        }

        match self.disk.get(key).await {
            Ok(Some(frame)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let evicted = self.memory.insert(key, frame.clone());
                self.evictions.fetch_add(evicted, Ordering::Relaxed);
                debug!(key = %key, tier = "disk", "Cache hit, promoted");
                Some(frame)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache read failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Memory-tier lookup that leaves the hit and miss counters alone.
    pub fn peek_memory(&self, key: &CacheKey) -> Option<CachedFrame> {
        self.memory.get(key.as_str())
    }

    /// Store `frame` in both tiers.
    ///
    /// The memory write always happens. A failed disk write is logged and
    /// leaves the entry memory-only.
    pub async fn set(&self, key: &CacheKey, frame: CachedFrame) -> SetOutcome {
        let mut outcome = SetOutcome {
            evicted: self.memory.insert(key, frame.clone()),
            stored_on_disk: false,
        };

        match self.disk.put(key, &frame).await {
            Ok(evicted) => {
                outcome.evicted += evicted;
                outcome.stored_on_disk = true;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache write failed, keeping in memory only");
            }
        }

        self.evictions.fetch_add(outcome.evicted, Ordering::Relaxed);
        outcome
    }

    /// Remove every entry of `clip_id` from both tiers.
    ///
    /// Returns the number of entries removed.
    pub async fn clear_for_clip(&self, clip_id: &ClipId) -> usize {
        let mut removed = self.memory.remove_clip(clip_id);
        match self.disk.remove_clip(clip_id).await {
            Ok(n) => removed += n,
            Err(e) => warn!(clip_id = %clip_id, error = %e, "Failed to clear disk cache for clip"),
        }
        removed
    }

    /// Empty both tiers, optionally resetting the counters.
    pub async fn clear_all(&self, reset_stats: bool) -> StorageResult<()> {
        self.memory.clear();
        if reset_stats {
            self.reset_stats();
        }
        self.disk.clear().await
    }

    /// Zero hits, misses and evictions.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Persist disk-tier bookkeeping.
    pub async fn flush(&self) -> StorageResult<()> {
        self.disk.flush().await
    }

    pub fn stats(&self) -> CacheStatistics {
        let (memory_bytes, memory_entries) = self.memory.usage();
        let (disk_bytes, disk_entries) = self.disk.usage();
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            memory_bytes,
            memory_entries,
            memory_capacity_bytes: self.memory.capacity(),
            disk_bytes,
            disk_entries,
            disk_capacity_bytes: self.disk.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawframe_models::{OutputFormat, Quality};
    use tempfile::TempDir;

    fn key(clip: &str, ts: f64) -> CacheKey {
        CacheKey::for_frame(&ClipId::from(clip), ts, Quality::High, OutputFormat::Jpeg)
    }

    fn frame(size: usize) -> CachedFrame {
        CachedFrame::new(vec![1u8; size], 8, 8)
    }

    async fn cache(dir: &TempDir, memory: u64, disk: u64) -> FrameCache {
        FrameCache::open(FrameCacheConfig {
            dir: dir.path().to_path_buf(),
            memory_capacity_bytes: memory,
            disk_capacity_bytes: disk,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_memory() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1000, 1000).await;
        let k = key("c", 1.0);

        let outcome = cache.set(&k, frame(100)).await;
        assert!(outcome.stored_on_disk);
        assert_eq!(cache.get(&k).await, Some(frame(100)));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 0));
        assert_eq!(stats.memory_bytes, 100);
        assert_eq!(stats.disk_bytes, 100);
    }

    #[tokio::test]
    async fn test_disk_hit_promotes() {
        let dir = TempDir::new().unwrap();
        // Memory holds one 100-byte frame, so the first one falls to disk only
        let cache = cache(&dir, 100, 10_000).await;
        let (a, b) = (key("c", 0.0), key("c", 1.0));

        cache.set(&a, frame(100)).await;
        cache.set(&b, frame(100)).await;
        assert_eq!(cache.stats().memory_entries, 1);

        assert_eq!(cache.get(&a).await, Some(frame(100)));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        // a promoted, b evicted from memory (2 memory evictions total)
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.disk_entries, 2);
    }

    #[tokio::test]
    async fn test_survives_restart_through_disk() {
        let dir = TempDir::new().unwrap();
        let k = key("c", 2.0);
        {
            let cache = cache(&dir, 1000, 1000).await;
            cache.set(&k, frame(10)).await;
            tokio_test::assert_ok!(cache.flush().await);
        }
        let cache = cache(&dir, 1000, 1000).await;
        assert_eq!(cache.get(&k).await, Some(frame(10)));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_miss_and_hit_rate() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1000, 1000).await;
        let k = key("c", 0.0);

        assert!(cache.get(&k).await.is_none());
        cache.set(&k, frame(1)).await;
        cache.get(&k).await;
        cache.get(&k).await;
        cache.get(&k).await;

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (3, 1));
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_lru_retention_across_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 30, 30).await;
        let keys: Vec<CacheKey> = (0..4).map(|i| key("c", i as f64)).collect();

        for k in &keys[..3] {
            cache.set(k, frame(10)).await;
        }
        cache.get(&keys[0]).await;
        cache.set(&keys[3], frame(10)).await;

        assert!(cache.get(&keys[1]).await.is_none());
        assert!(cache.get(&keys[0]).await.is_some());
        // One eviction per tier
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_clear_for_clip() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1000, 1000).await;
        cache.set(&key("one", 0.0), frame(5)).await;
        cache.set(&key("one", 1.0), frame(5)).await;
        cache.set(&key("two", 0.0), frame(5)).await;

        assert_eq!(cache.clear_for_clip(&ClipId::from("one")).await, 4);
        assert!(cache.get(&key("one", 0.0)).await.is_none());
        assert!(cache.get(&key("two", 0.0)).await.is_some());
        let stats = cache.stats();
        assert_eq!((stats.memory_entries, stats.disk_entries), (1, 1));
    }

    #[tokio::test]
    async fn test_peek_memory_skips_counters() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1000, 1000).await;
        let k = key("c", 0.0);

        assert!(cache.peek_memory(&k).is_none());
        cache.set(&k, frame(4)).await;
        assert_eq!(cache.peek_memory(&k), Some(frame(4)));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_disk_failure_keeps_frame_in_memory() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("frames");
        let cache = FrameCache::open(FrameCacheConfig {
            dir: cache_dir.clone(),
            memory_capacity_bytes: 1000,
            disk_capacity_bytes: 1000,
        })
        .await
        .unwrap();
        // Writes into a vanished directory fail regardless of privileges
        std::fs::remove_dir_all(&cache_dir).unwrap();

        let k = key("c", 3.0);
        let outcome = cache.set(&k, frame(20)).await;
        assert_eq!(
            outcome,
            SetOutcome {
                evicted: 0,
                stored_on_disk: false
            }
        );

        assert_eq!(cache.get(&k).await, Some(frame(20)));
        let stats = cache.stats();
        assert_eq!(stats.disk_entries, 0);
        assert_eq!(stats.disk_bytes, 0);
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1000, 1000).await;
        let k = key("c", 0.0);
        cache.set(&k, frame(5)).await;
        cache.get(&k).await;

        cache.clear_all(false).await.unwrap();
        let stats = cache.stats();
        assert_eq!((stats.memory_bytes, stats.disk_bytes), (0, 0));
        assert_eq!(stats.hits, 1);

        cache.clear_all(true).await.unwrap();
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_zero_byte_payload() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1000, 1000).await;
        let k = key("c", 0.0);
        cache.set(&k, CachedFrame::new(Vec::<u8>::new(), 1, 1)).await;
        let got = cache.get(&k).await.unwrap();
        assert!(got.data.is_empty());
    }
}
