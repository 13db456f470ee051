//! On-disk LRU tier.
//!
//! Layout of the cache directory:
//!
//! ```text
//! {key}.frame     one payload per key (12-byte header + bytes)
//! index.json      key -> size, recency tick
//! .tmp-*          in-flight writes, swept on open
//! ```
//!
//! The index is flushed every few writes and on shutdown. On open it is
//! reconciled against the directory, so a lost or stale index only costs
//! recency information.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

use rawframe_models::cache_key::FRAME_FILE_EXTENSION;
use rawframe_models::{CacheKey, ClipId};

use crate::error::{StorageError, StorageResult};
use crate::frame::{CachedFrame, HEADER_LEN};

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;
const TEMP_PREFIX: &str = ".tmp-";
/// Writes between index flushes.
const INDEX_FLUSH_INTERVAL: u64 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    size: u64,
    last_access: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiskIndex {
    version: u32,
    tick: u64,
    entries: HashMap<String, IndexRecord>,
}

#[derive(Default)]
struct DiskState {
    index: DiskIndex,
    used: u64,
    writes_since_flush: u64,
}

impl DiskState {
    fn next_tick(&mut self) -> u64 {
        self.index.tick += 1;
        self.index.tick
    }

    fn remove(&mut self, key: &str) -> Option<IndexRecord> {
        let record = self.index.entries.remove(key)?;
        self.used -= record.size;
        Some(record)
    }

    /// Pick victims oldest-first until usage fits, never `keep`.
    fn evict_to(&mut self, capacity: u64, keep: Option<&str>) -> Vec<String> {
        if self.used <= capacity {
            return Vec::new();
        }
        let mut candidates: Vec<(u64, String)> = self
            .index
            .entries
            .iter()
            .filter(|(k, _)| Some(k.as_str()) != keep)
            .map(|(k, r)| (r.last_access, k.clone()))
            .collect();
        candidates.sort_unstable();

        let mut victims = Vec::new();
        for (_, key) in candidates {
            if self.used <= capacity {
                break;
            }
            self.remove(&key);
            victims.push(key);
        }
        victims
    }
}

/// Disk tier rooted at one directory.
pub struct DiskTier {
    dir: PathBuf,
    capacity: u64,
    state: Mutex<DiskState>,
    /// Serializes index writes so an older snapshot never lands last.
    flush_lock: tokio::sync::Mutex<()>,
    temp_counter: AtomicU64,
}

impl DiskTier {
    /// Open (or create) the tier, sweeping temp files and reconciling the
    /// index with the directory contents.
    pub async fn open(dir: impl Into<PathBuf>, capacity_bytes: u64) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::directory(&dir, e))?;

        let stored = load_index(&dir).await;
        let (state, swept) = scan_directory(&dir, stored).await?;

        let tier = Self {
            dir,
            capacity: capacity_bytes,
            state: Mutex::new(state),
            flush_lock: tokio::sync::Mutex::new(()),
            temp_counter: AtomicU64::new(0),
        };

        let victims = tier.state.lock().evict_to(tier.capacity, None);
        tier.delete_files(&victims).await;
        tier.flush().await?;

        let (bytes, entries) = tier.usage();
        info!(
            dir = %tier.dir.display(),
            entries,
            bytes,
            capacity = tier.capacity,
            swept_temp_files = swept,
            evicted = victims.len(),
            "Disk cache opened"
        );

        Ok(tier)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, FRAME_FILE_EXTENSION))
    }

    /// Read `key`, refreshing its recency.
    ///
    /// A file that vanished or fails to parse is dropped from the index and
    /// reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> StorageResult<Option<CachedFrame>> {
        if !self.state.lock().index.entries.contains_key(key.as_str()) {
            return Ok(None);
        }

        let path = self.path_for(key.as_str());
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.state.lock().remove(key.as_str());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let frame = match CachedFrame::from_file_bytes(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping corrupt cache file");
                self.state.lock().remove(key.as_str());
                let _ = fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        self.touch(key.as_str());
        Ok(Some(frame))
    }

    /// Refresh the recency of `key` without reading it.
    pub fn touch(&self, key: &str) {
        let mut state = self.state.lock();
        let tick = state.next_tick();
        if let Some(record) = state.index.entries.get_mut(key) {
            record.last_access = tick;
        }
    }

    /// Write `key` atomically, then evict down to capacity.
    ///
    /// Returns the number of evicted entries.
    pub async fn put(&self, key: &CacheKey, frame: &CachedFrame) -> StorageResult<u64> {
        let temp = self.dir.join(format!(
            "{}{}-{}",
            TEMP_PREFIX,
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&temp, frame.to_file_bytes()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, self.path_for(key.as_str())).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        let (victims, flush_due) = {
            let mut state = self.state.lock();
            state.remove(key.as_str());
            let tick = state.next_tick();
            state.used += frame.size();
            state.index.entries.insert(
                key.as_str().to_string(),
                IndexRecord {
                    size: frame.size(),
                    last_access: tick,
                },
            );
            let victims = state.evict_to(self.capacity, Some(key.as_str()));
            state.writes_since_flush += 1;
            (victims, state.writes_since_flush >= INDEX_FLUSH_INTERVAL)
        };

        self.delete_files(&victims).await;

        if flush_due {
            self.flush().await?;
        }

        Ok(victims.len() as u64)
    }

    /// Drop every entry belonging to `clip_id`.
    pub async fn remove_clip(&self, clip_id: &ClipId) -> StorageResult<usize> {
        let removed: Vec<String> = {
            let mut state = self.state.lock();
            let keys: Vec<String> = state
                .index
                .entries
                .keys()
                .filter(|k| CacheKey::key_belongs_to(k, clip_id))
                .cloned()
                .collect();
            for key in &keys {
                state.remove(key);
            }
            keys
        };

        self.delete_files(&removed).await;
        self.flush().await?;
        Ok(removed.len())
    }

    /// Drop every entry.
    pub async fn clear(&self) -> StorageResult<()> {
        let keys: Vec<String> = {
            let mut state = self.state.lock();
            let keys = state.index.entries.keys().cloned().collect();
            state.index.entries.clear();
            state.used = 0;
            keys
        };
        self.delete_files(&keys).await;
        self.flush().await
    }

    /// Current `(bytes, entries)`.
    pub fn usage(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.used, state.index.entries.len() as u64)
    }

    /// Persist the index.
    pub async fn flush(&self) -> StorageResult<()> {
        let _guard = self.flush_lock.lock().await;

        let json = {
            let mut state = self.state.lock();
            state.writes_since_flush = 0;
            serde_json::to_vec(&state.index)?
        };

        let temp = self.dir.join(format!("{}index-{}", TEMP_PREFIX, std::process::id()));
        fs::write(&temp, &json).await?;
        fs::rename(&temp, self.dir.join(INDEX_FILE)).await?;
        Ok(())
    }

    async fn delete_files(&self, keys: &[String]) {
        for key in keys {
            match fs::remove_file(self.path_for(key)).await {
                Ok(()) => debug!(key = %key, "Removed frame from disk"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to remove cache file"),
            }
        }
    }
}

async fn load_index(dir: &Path) -> Option<DiskIndex> {
    let raw = fs::read(dir.join(INDEX_FILE)).await.ok()?;
    match serde_json::from_slice::<DiskIndex>(&raw) {
        Ok(index) if index.version == INDEX_VERSION => Some(index),
        Ok(index) => {
            warn!(version = index.version, "Ignoring cache index with unknown version");
            None
        }
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable cache index");
            None
        }
    }
}

/// Build tier state from the files actually present.
///
/// Known files keep their recorded recency; unknown ones are ordered by
/// mtime and placed before them. Returns the state and the number of temp
/// files removed.
async fn scan_directory(dir: &Path, stored: Option<DiskIndex>) -> StorageResult<(DiskState, usize)> {
    let rebuilt = stored.is_none();
    let mut stored = stored.unwrap_or_default();

    let mut known = Vec::new();
    let mut unknown: Vec<(SystemTime, String, u64)> = Vec::new();
    let mut swept = 0;

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::directory(dir, e))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();

        if name.starts_with(TEMP_PREFIX) {
            if fs::remove_file(entry.path()).await.is_ok() {
                swept += 1;
            }
            continue;
        }

        let Some(key) = CacheKey::key_from_file_name(&name) else {
            continue;
        };
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let size = meta.len().saturating_sub(HEADER_LEN as u64);

        match stored.entries.remove(key) {
            Some(record) => known.push((key.to_string(), IndexRecord { size, ..record })),
            None => unknown.push((
                meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                key.to_string(),
                size,
            )),
        }
    }

    if rebuilt {
        info!(files = unknown.len(), "Rebuilding cache index from directory");
    }

    unknown.sort();
    let offset = unknown.len() as u64;

    let mut state = DiskState::default();
    state.index.version = INDEX_VERSION;
    for (i, (_, key, size)) in unknown.into_iter().enumerate() {
        state.used += size;
        state.index.entries.insert(
            key,
            IndexRecord {
                size,
                last_access: i as u64 + 1,
            },
        );
    }
    let mut max_tick = offset;
    for (key, record) in known {
        let record = IndexRecord {
            last_access: record.last_access + offset,
            ..record
        };
        max_tick = max_tick.max(record.last_access);
        state.used += record.size;
        state.index.entries.insert(key, record);
    }
    state.index.tick = max_tick.max(stored.tick + offset);

    Ok((state, swept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawframe_models::{OutputFormat, Quality};
    use tempfile::TempDir;

    fn key(clip: &str, ts: f64) -> CacheKey {
        CacheKey::for_frame(&ClipId::from(clip), ts, Quality::Medium, OutputFormat::Jpeg)
    }

    fn frame(size: usize) -> CachedFrame {
        CachedFrame::new(vec![3u8; size], 2, 2)
    }

    #[tokio::test]
    async fn test_put_get() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 1000).await.unwrap();
        let k = key("c", 1.0);

        tier.put(&k, &frame(10)).await.unwrap();
        assert!(dir.path().join(k.file_name()).exists());
        assert_eq!(tier.get(&k).await.unwrap(), Some(frame(10)));
        assert_eq!(tier.usage(), (10, 1));
        assert_eq!(tier.get(&key("c", 2.0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 20).await.unwrap();
        let (a, b, c) = (key("c", 0.0), key("c", 1.0), key("c", 2.0));

        tier.put(&a, &frame(10)).await.unwrap();
        tier.put(&b, &frame(10)).await.unwrap();
        tier.get(&a).await.unwrap();

        assert_eq!(tier.put(&c, &frame(10)).await.unwrap(), 1);
        assert!(!dir.path().join(b.file_name()).exists());
        assert!(tier.get(&a).await.unwrap().is_some());
        assert!(tier.get(&c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_oversized_write_kept() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 5).await.unwrap();
        let (a, b) = (key("c", 0.0), key("c", 1.0));
        tier.put(&a, &frame(3)).await.unwrap();
        assert_eq!(tier.put(&b, &frame(50)).await.unwrap(), 1);
        assert_eq!(tier.usage(), (50, 1));
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries_and_recency() {
        let dir = TempDir::new().unwrap();
        let (a, b, c) = (key("c", 0.0), key("c", 1.0), key("c", 2.0));
        {
            let tier = DiskTier::open(dir.path(), 100).await.unwrap();
            tier.put(&a, &frame(10)).await.unwrap();
            tier.put(&b, &frame(10)).await.unwrap();
            tier.get(&a).await.unwrap();
            tier.flush().await.unwrap();
        }

        let tier = DiskTier::open(dir.path(), 20).await.unwrap();
        assert_eq!(tier.usage(), (20, 2));
        tier.put(&c, &frame(10)).await.unwrap();
        // `b` was least recently used before the restart
        assert!(tier.get(&b).await.unwrap().is_none());
        assert!(tier.get(&a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rebuild_without_index_and_sweep_temp() {
        let dir = TempDir::new().unwrap();
        let k = key("c", 5.0);
        {
            let tier = DiskTier::open(dir.path(), 100).await.unwrap();
            tier.put(&k, &frame(7)).await.unwrap();
        }
        std::fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();
        std::fs::write(dir.path().join(".tmp-999-0"), b"partial").unwrap();

        let tier = DiskTier::open(dir.path(), 100).await.unwrap();
        assert_eq!(tier.usage(), (7, 1));
        assert!(!dir.path().join(".tmp-999-0").exists());
        assert_eq!(tier.get(&k).await.unwrap(), Some(frame(7)));
    }

    #[tokio::test]
    async fn test_remove_clip_and_clear() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 1000).await.unwrap();
        tier.put(&key("one", 0.0), &frame(1)).await.unwrap();
        tier.put(&key("one", 1.0), &frame(1)).await.unwrap();
        tier.put(&key("two", 0.0), &frame(1)).await.unwrap();

        assert_eq!(tier.remove_clip(&ClipId::from("one")).await.unwrap(), 2);
        assert_eq!(tier.usage(), (1, 1));
        assert!(!dir.path().join(key("one", 0.0).file_name()).exists());

        tier.clear().await.unwrap();
        assert_eq!(tier.usage(), (0, 0));
        assert!(!dir.path().join(key("two", 0.0).file_name()).exists());
    }

    #[tokio::test]
    async fn test_vanished_file_is_miss() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path(), 1000).await.unwrap();
        let k = key("c", 0.0);
        tier.put(&k, &frame(4)).await.unwrap();
        std::fs::remove_file(dir.path().join(k.file_name())).unwrap();

        assert_eq!(tier.get(&k).await.unwrap(), None);
        assert_eq!(tier.usage(), (0, 0));
    }
}
