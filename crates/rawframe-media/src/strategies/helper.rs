//! Decoding through an out-of-process extractor binary.
//!
//! Protocol (one process per call, JSON reply on stdout):
//!
//! ```text
//! <helper> metadata <input>
//!   {"success":true,"frame_count":N,"width":W,"height":H,"frame_rate":F,"duration":D}
//! <helper> extract <input> <frame_index> <output>
//!   {"success":true,"path":"<output>","width":W,"height":H}
//! ```
//!
//! Failures reply `{"success":false,"error":"..."}` and/or exit non-zero.
//! The extracted image is a binary PPM or a JPEG.

use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use rawframe_models::ProbedMetadata;

use crate::command::capture_output_with_env;
use crate::error::{MediaError, MediaResult};
use crate::frame::{DecodedFrame, PixelData};
use crate::ppm::{is_ppm, parse_ppm};
use crate::strategy::DecodeStrategy;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

#[cfg(target_os = "macos")]
const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(target_os = "macos"))]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

#[derive(Debug, Deserialize)]
struct HelperReply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    frame_count: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    frame_rate: Option<f64>,
    duration: Option<f64>,
}

/// Strategy that shells out to a helper extractor.
pub struct HelperProcessStrategy {
    program: PathBuf,
    scratch_dir: PathBuf,
    timeout: Duration,
    /// Directory holding the vendor SDK libraries the helper links against
    library_path: Option<PathBuf>,
}

impl HelperProcessStrategy {
    pub fn new(program: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            scratch_dir: scratch_dir.into(),
            timeout,
            library_path: None,
        }
    }

    /// Prepend `dir` to the helper's dynamic library search path.
    pub fn with_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_path = Some(dir.into());
        self
    }

    fn child_env(&self) -> Vec<(&'static str, OsString)> {
        let Some(dir) = &self.library_path else {
            return Vec::new();
        };
        let mut value = dir.as_os_str().to_os_string();
        if let Some(existing) = std::env::var_os(LIBRARY_PATH_VAR).filter(|v| !v.is_empty()) {
            value.push(":");
            value.push(existing);
        }
        vec![(LIBRARY_PATH_VAR, value)]
    }

    async fn call(&self, args: Vec<OsString>) -> MediaResult<HelperReply> {
        let output =
            capture_output_with_env(&self.program, args, &self.child_env(), self.timeout).await?;
        let reply = parse_reply(&output.stdout)?;
        if reply.success == Some(false) || reply.error.is_some() {
            return Err(MediaError::decode_failed(
                "helper",
                reply.error.unwrap_or_else(|| "helper reported failure".to_string()),
            ));
        }
        Ok(reply)
    }
}

/// Parse the JSON object in the helper's stdout, tolerating log noise
/// around it.
fn parse_reply(stdout: &[u8]) -> MediaResult<HelperReply> {
    let text = String::from_utf8_lossy(stdout);
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(serde_json::from_str(&text[start..=end])?),
        _ => Err(MediaError::invalid_output(format!(
            "helper produced no JSON reply: {:?}",
            text.trim()
        ))),
    }
}

#[async_trait]
impl DecodeStrategy for HelperProcessStrategy {
    fn name(&self) -> &'static str {
        "helper"
    }

    fn supports_concurrent_reads(&self) -> bool {
        false
    }

    async fn probe(&self, path: &Path) -> MediaResult<ProbedMetadata> {
        let reply = self
            .call(vec!["metadata".into(), path.as_os_str().to_os_string()])
            .await?;

        Ok(ProbedMetadata {
            width: reply.width,
            height: reply.height,
            fps: reply.frame_rate,
            fps_rational: None,
            frame_count: reply.frame_count,
            duration: reply.duration,
        })
    }

    async fn decode_frame(
        &self,
        path: &Path,
        frame_index: u64,
        _fps: f64,
    ) -> MediaResult<DecodedFrame> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("helper-")
            .suffix(".ppm")
            .tempfile_in(&self.scratch_dir)?;
        let out_path = scratch.path().to_path_buf();

        debug!(
            input = %path.display(),
            frame_index,
            output = %out_path.display(),
            "Extracting frame with helper"
        );

        self.call(vec![
            "extract".into(),
            path.as_os_str().to_os_string(),
            frame_index.to_string().into(),
            out_path.as_os_str().to_os_string(),
        ])
        .await?;

        let data = tokio::fs::read(&out_path).await?;
        // `scratch` drops here and removes the file
        drop(scratch);

        decode_image(&data)
    }
}

fn decode_image(data: &[u8]) -> MediaResult<DecodedFrame> {
    if is_ppm(data) {
        return parse_ppm(data);
    }
    if data.starts_with(&JPEG_MAGIC) {
        let (width, height) = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map(|img| (img.width(), img.height()))?;
        return Ok(DecodedFrame::new(width, height, PixelData::Jpeg(data.to_vec())));
    }
    Err(MediaError::invalid_output("helper wrote an unrecognized image"))
}
