//! Scripted decode strategies and service fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use rawframe_engine::{EngineConfig, FrameService};
use rawframe_media::{DecodeStrategy, DecodedFrame, MediaError, MediaResult, PixelData, StrategySelector};
use rawframe_models::ProbedMetadata;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 36;

/// Decoder that counts calls and fails on chosen frames.
pub struct ScriptedStrategy {
    pub name: &'static str,
    pub concurrent: bool,
    pub delay: Duration,
    pub fail_all: bool,
    pub failing_frames: HashSet<u64>,
    pub decodes: AtomicUsize,
    pub requested: Mutex<Vec<u64>>,
    /// Highest number of decodes observed running at once
    pub max_parallel: AtomicUsize,
    running: AtomicUsize,
}

impl ScriptedStrategy {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            concurrent: true,
            delay: Duration::from_millis(0),
            fail_all: false,
            failing_frames: HashSet::new(),
            decodes: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            max_parallel: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail_all: true,
            ..Self::new(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn serial(mut self) -> Self {
        self.concurrent = false;
        self
    }

    pub fn failing_on(mut self, frames: &[u64]) -> Self {
        self.failing_frames = frames.iter().copied().collect();
        self
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecodeStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_concurrent_reads(&self) -> bool {
        self.concurrent
    }

    async fn probe(&self, _path: &Path) -> MediaResult<ProbedMetadata> {
        Ok(ProbedMetadata {
            width: Some(WIDTH),
            height: Some(HEIGHT),
            fps: Some(24.0),
            fps_rational: None,
            frame_count: Some(240),
            duration: Some(10.0),
        })
    }

    async fn decode_frame(
        &self,
        _path: &Path,
        frame_index: u64,
        _fps: f64,
    ) -> MediaResult<DecodedFrame> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(frame_index);

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_parallel.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.failing_frames.contains(&frame_index) {
            return Err(MediaError::decode_failed(self.name, format!("cannot read frame {}", frame_index)));
        }
        let shade = (frame_index % 256) as u8;
        Ok(DecodedFrame::new(
            WIDTH,
            HEIGHT,
            PixelData::Rgba(vec![shade; (WIDTH * HEIGHT * 4) as usize]),
        ))
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub service: Arc<FrameService>,
}

impl Fixture {
    pub fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            cache_dir: dir.path().join("cache"),
            source_dir: dir.path().join("uploads"),
            scratch_dir: dir.path().join("scratch"),
            memory_cache_mb: 16,
            disk_cache_mb: 64,
            ..Default::default()
        }
    }

    /// Service whose `.braw` chain is `strategies`, with one clip `clip1`.
    pub async fn new(strategies: Vec<Arc<dyn DecodeStrategy>>) -> Self {
        let dir = TempDir::new().unwrap();
        let selector = StrategySelector::new().with_chain("braw", strategies);
        let service = FrameService::with_selector(Self::config(&dir), selector)
            .await
            .unwrap();
        std::fs::write(dir.path().join("uploads").join("clip1.braw"), b"braw").unwrap();
        Self {
            dir,
            service: Arc::new(service),
        }
    }
}

pub fn chain(strategies: &[&Arc<ScriptedStrategy>]) -> Vec<Arc<dyn DecodeStrategy>> {
    strategies
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn DecodeStrategy>)
        .collect()
}
