//! In-process LRU tier bounded by payload bytes.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::debug;

use rawframe_models::{CacheKey, ClipId};

use crate::frame::CachedFrame;

struct MemoryEntry {
    frame: CachedFrame,
    clip_id: ClipId,
    created_at: Instant,
    last_access: u64,
    access_count: u64,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    used: u64,
    tick: u64,
}

impl MemoryState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        self.used -= entry.frame.size();
        Some(entry)
    }
}

/// Memory tier. Every operation is one short critical section.
pub struct MemoryTier {
    capacity: u64,
    state: Mutex<MemoryState>,
}

impl MemoryTier {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity: capacity_bytes,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Look up `key`, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<CachedFrame> {
        let mut state = self.state.lock();
        let tick = state.next_tick();
        let state = &mut *state;

        let entry = state.entries.get_mut(key)?;
        state.recency.remove(&entry.last_access);
        entry.last_access = tick;
        entry.access_count += 1;
        state.recency.insert(tick, key.to_string());

        Some(entry.frame.clone())
    }

    /// Insert or replace `key`, then evict down to capacity.
    ///
    /// The inserted entry is never evicted by its own insertion, even when
    /// it alone exceeds the capacity. Returns the number of evicted entries.
    pub fn insert(&self, key: &CacheKey, frame: CachedFrame) -> u64 {
        let mut state = self.state.lock();
        state.remove(key.as_str());

        let tick = state.next_tick();
        state.used += frame.size();
        state.entries.insert(
            key.as_str().to_string(),
            MemoryEntry {
                frame,
                clip_id: key.clip_id().clone(),
                created_at: Instant::now(),
                last_access: tick,
                access_count: 0,
            },
        );
        state.recency.insert(tick, key.as_str().to_string());

        let mut evicted = 0;
        while state.used > self.capacity && state.entries.len() > 1 {
            let Some(oldest) = state.recency.values().next().cloned() else {
                break;
            };
            if let Some(entry) = state.remove(&oldest) {
                debug!(
                    key = %oldest,
                    size = entry.frame.size(),
                    access_count = entry.access_count,
                    age_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Evicted frame from memory"
                );
                evicted += 1;
            } else {
                state.recency.pop_first();
            }
        }
        evicted
    }

    /// Drop every entry belonging to `clip_id`.
    pub fn remove_clip(&self, clip_id: &ClipId) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| &e.clip_id == clip_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        *self.state.lock() = MemoryState::default();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Current `(bytes, entries)`.
    pub fn usage(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.used, state.entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawframe_models::{OutputFormat, Quality};

    fn key(clip: &str, ts: f64) -> CacheKey {
        CacheKey::for_frame(&ClipId::from(clip), ts, Quality::Low, OutputFormat::Jpeg)
    }

    fn frame(size: usize) -> CachedFrame {
        CachedFrame::new(vec![7u8; size], 1, 1)
    }

    #[test]
    fn test_lru_keeps_recent() {
        let tier = MemoryTier::new(30);
        let (a, b, c, d) = (key("c", 0.0), key("c", 1.0), key("c", 2.0), key("c", 3.0));
        tier.insert(&a, frame(10));
        tier.insert(&b, frame(10));
        tier.insert(&c, frame(10));

        // Touch `a` so `b` becomes the oldest
        assert!(tier.get(a.as_str()).is_some());

        assert_eq!(tier.insert(&d, frame(10)), 1);
        assert!(tier.contains(a.as_str()));
        assert!(!tier.contains(b.as_str()));
        assert!(tier.contains(c.as_str()));
        assert!(tier.contains(d.as_str()));
        assert_eq!(tier.usage(), (30, 3));
    }

    #[test]
    fn test_oversized_entry_survives() {
        let tier = MemoryTier::new(10);
        let (a, b) = (key("c", 0.0), key("c", 1.0));
        tier.insert(&a, frame(5));
        assert_eq!(tier.insert(&b, frame(50)), 1);
        assert!(tier.contains(b.as_str()));
        assert_eq!(tier.usage(), (50, 1));
    }

    #[test]
    fn test_replace_adjusts_usage() {
        let tier = MemoryTier::new(100);
        let a = key("c", 0.0);
        tier.insert(&a, frame(10));
        tier.insert(&a, frame(4));
        assert_eq!(tier.usage(), (4, 1));
    }

    #[test]
    fn test_remove_clip() {
        let tier = MemoryTier::new(100);
        tier.insert(&key("one", 0.0), frame(1));
        tier.insert(&key("one", 1.0), frame(1));
        tier.insert(&key("two", 0.0), frame(1));

        assert_eq!(tier.remove_clip(&ClipId::from("one")), 2);
        assert_eq!(tier.usage(), (1, 1));
        assert!(tier.contains(key("two", 0.0).as_str()));
    }

    #[test]
    fn test_zero_byte_entries() {
        let tier = MemoryTier::new(0);
        let (a, b) = (key("c", 0.0), key("c", 1.0));
        tier.insert(&a, frame(0));
        assert_eq!(tier.insert(&b, frame(0)), 0);
        assert_eq!(tier.usage(), (0, 2));
    }
}
