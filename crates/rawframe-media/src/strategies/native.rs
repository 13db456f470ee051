//! In-process decoding through a vendor SDK binding.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rawframe_models::ProbedMetadata;

use super::check_frame_range;
use crate::error::{MediaError, MediaResult};
use crate::frame::{DecodedFrame, PixelData};
use crate::strategy::DecodeStrategy;

/// Clip information reported by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkClipInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frame_count: u64,
}

/// One frame as returned by the SDK: 8-bit RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Blocking binding to the camera vendor's decoding SDK.
///
/// Implementations open the clip, run a read job for one frame, and return
/// the processed RGBA image. Calls may block for a long time and must not
/// be made concurrently against the same clip.
pub trait BrawSdk: Send + Sync + 'static {
    fn clip_info(&self, path: &Path) -> MediaResult<SdkClipInfo>;

    fn read_frame(&self, path: &Path, frame_index: u64) -> MediaResult<SdkFrame>;
}

/// Strategy backed by an in-process [`BrawSdk`].
pub struct NativeSdkStrategy {
    sdk: Arc<dyn BrawSdk>,
}

impl NativeSdkStrategy {
    pub fn new(sdk: Arc<dyn BrawSdk>) -> Self {
        Self { sdk }
    }

    async fn blocking<T, F>(&self, path: &Path, f: F) -> MediaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn BrawSdk, &Path) -> MediaResult<T> + Send + 'static,
    {
        let sdk = Arc::clone(&self.sdk);
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || f(sdk.as_ref(), &path))
            .await
            .map_err(|e| MediaError::internal(format!("SDK task failed: {}", e)))?
    }
}

#[async_trait]
impl DecodeStrategy for NativeSdkStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports_concurrent_reads(&self) -> bool {
        false
    }

    async fn probe(&self, path: &Path) -> MediaResult<ProbedMetadata> {
        let info = self.blocking(path, |sdk, path| sdk.clip_info(path)).await?;
        Ok(ProbedMetadata {
            width: Some(info.width),
            height: Some(info.height),
            fps: Some(info.frame_rate),
            fps_rational: None,
            frame_count: Some(info.frame_count),
            duration: None,
        })
    }

    async fn decode_frame(
        &self,
        path: &Path,
        frame_index: u64,
        _fps: f64,
    ) -> MediaResult<DecodedFrame> {
        let frame = self
            .blocking(path, move |sdk, path| {
                let info = sdk.clip_info(path)?;
                check_frame_range(frame_index, info.frame_count)?;
                sdk.read_frame(path, frame_index)
            })
            .await?;

        let decoded = DecodedFrame::new(frame.width, frame.height, PixelData::Rgba(frame.rgba));
        decoded
            .validate()
            .map_err(|e| MediaError::decode_failed("native", e.to_string()))?;
        Ok(decoded)
    }
}
