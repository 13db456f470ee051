//! Photographic RAW stills through a dcraw-compatible converter.
//!
//! A still is treated as a one-frame clip at 1 fps.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rawframe_models::ProbedMetadata;

use super::check_frame_range;
use crate::command::capture_output;
use crate::error::{MediaError, MediaResult};
use crate::frame::DecodedFrame;
use crate::ppm::parse_ppm;
use crate::strategy::DecodeStrategy;

pub struct RawStillStrategy {
    program: PathBuf,
    timeout: Duration,
}

impl RawStillStrategy {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

/// Pull the output dimensions from `dcraw -i -v` text.
///
/// `Output size` accounts for rotation and binning, so it wins over
/// `Image size` when both are present.
fn parse_identify(text: &str) -> Option<(u32, u32)> {
    let mut image = None;
    let mut output = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let dims = value.split_once('x').and_then(|(w, h)| {
            Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?))
        });
        match key.trim() {
            "Image size" => image = dims,
            "Output size" => output = dims,
            _ => {}
        }
    }
    output.or(image)
}

#[async_trait]
impl DecodeStrategy for RawStillStrategy {
    fn name(&self) -> &'static str {
        "raw_still"
    }

    async fn probe(&self, path: &Path) -> MediaResult<ProbedMetadata> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let output = capture_output(
            &self.program,
            [OsStr::new("-i"), OsStr::new("-v"), path.as_os_str()],
            self.timeout,
        )
        .await?;

        let text = String::from_utf8_lossy(&output.stdout);
        let (width, height) = parse_identify(&text)
            .ok_or_else(|| MediaError::invalid_output("converter reported no image size"))?;

        Ok(ProbedMetadata {
            width: Some(width),
            height: Some(height),
            fps: Some(1.0),
            fps_rational: None,
            frame_count: Some(1),
            duration: None,
        })
    }

    async fn decode_frame(
        &self,
        path: &Path,
        frame_index: u64,
        _fps: f64,
    ) -> MediaResult<DecodedFrame> {
        check_frame_range(frame_index, 1)?;

        // -c: write to stdout, -w: camera white balance
        let output = capture_output(
            &self.program,
            [OsStr::new("-c"), OsStr::new("-w"), path.as_os_str()],
            self.timeout,
        )
        .await?;

        parse_ppm(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identify() {
        let text = "\nFilename: IMG_0001.CR2\nCamera: Canon EOS R5\n\
                    Image size:  8192 x 5464\nOutput size: 5464 x 8192\n";
        assert_eq!(parse_identify(text), Some((5464, 8192)));

        let text = "Image size:  6016 x 4016\n";
        assert_eq!(parse_identify(text), Some((6016, 4016)));

        assert_eq!(parse_identify("Camera: unknown\n"), None);
    }

    #[tokio::test]
    async fn test_only_frame_zero_exists() {
        let strategy = RawStillStrategy::new("dcraw", Duration::from_secs(5));
        let err = strategy
            .decode_frame(Path::new("still.dng"), 1, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FrameOutOfRange { frame: 1, last: 0 }));
    }
}
