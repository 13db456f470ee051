//! Generic transcoder strategy backed by FFmpeg/FFprobe.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use rawframe_models::ProbedMetadata;

use crate::command::{capture_output, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::frame::DecodedFrame;
use crate::ppm::parse_ppm;
use crate::probe::probe_video;
use crate::strategy::DecodeStrategy;

/// Seeks by time and grabs one frame through FFmpeg.
pub struct TranscoderStrategy {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl TranscoderStrategy {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout,
        }
    }
}

/// Seek offset for the middle of `frame_index`, so rounding in the
/// demuxer never lands on the previous frame.
fn seek_seconds(frame_index: u64, fps: f64) -> f64 {
    if fps <= 0.0 || !fps.is_finite() {
        return 0.0;
    }
    (frame_index as f64 + 0.5) / fps
}

#[async_trait]
impl DecodeStrategy for TranscoderStrategy {
    fn name(&self) -> &'static str {
        "transcoder"
    }

    async fn probe(&self, path: &Path) -> MediaResult<ProbedMetadata> {
        probe_video(&self.ffprobe, path, self.timeout).await
    }

    async fn decode_frame(
        &self,
        path: &Path,
        frame_index: u64,
        fps: f64,
    ) -> MediaResult<DecodedFrame> {
        let cmd = FfmpegCommand::to_stdout(path)
            .seek(seek_seconds(frame_index, fps))
            .single_frame()
            .ppm_image();

        debug!(input = %path.display(), frame_index, "Grabbing frame with ffmpeg");

        let output = capture_output(&self.ffmpeg, cmd.build_args(), self.timeout).await?;
        if output.stdout.is_empty() {
            // FFmpeg exits 0 with no output when seeking past the last frame
            return Err(MediaError::decode_failed(
                "transcoder",
                format!("no frame produced at index {}", frame_index),
            ));
        }

        parse_ppm(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_targets_frame_center() {
        assert!((seek_seconds(0, 24.0) - 0.5 / 24.0).abs() < 1e-12);
        assert!((seek_seconds(24, 24.0) - 24.5 / 24.0).abs() < 1e-12);
        assert_eq!(seek_seconds(5, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let strategy = TranscoderStrategy::new("ffmpeg", "ffprobe", Duration::from_secs(5));
        let err = strategy
            .probe(Path::new("/nonexistent/clip.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
