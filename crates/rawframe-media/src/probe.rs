//! FFprobe clip information.

use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use rawframe_models::{FrameRate, ProbedMetadata};

use crate::command::capture_output;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe a clip with `ffprobe` and return what it reports.
pub async fn probe_video(
    ffprobe: &Path,
    path: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<ProbedMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = capture_output(
        ffprobe,
        [
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ],
        timeout,
    )
    .await?;

    parse_ffprobe_json(&output.stdout)
}

/// Extract metadata from ffprobe's JSON document.
pub fn parse_ffprobe_json(json: &[u8]) -> MediaResult<ProbedMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_output("No video stream found"))?;

    // Containers report 0/0 for unknown rates; skip those
    let fps_rational = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .filter_map(|r| FrameRate::parse(r))
        .find(|r| r.num > 0 && r.den > 0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0);

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok());

    Ok(ProbedMetadata {
        width: stream.width,
        height: stream.height,
        fps: fps_rational.and_then(|r| r.as_f64()),
        fps_rational,
        frame_count,
        duration,
    })
}
