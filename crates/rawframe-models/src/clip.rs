//! Clip identity and canonical clip metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier for a source clip.
///
/// Ids are caller-assigned (usually by the upload layer) or generated as
/// 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    /// Generate a new random clip ID (32 hex chars).
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id can be used as a file name prefix.
    ///
    /// Ids are matched against directory entries, so anything that could
    /// escape the source directory is rejected.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClipId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Exact frame rate as a rational number (e.g. 24000/1001).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Frames per second as a float, `None` for a zero denominator.
    pub fn as_f64(&self) -> Option<f64> {
        if self.den == 0 {
            None
        } else {
            Some(self.num as f64 / self.den as f64)
        }
    }

    /// Parse `"30000/1001"` or `"25"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse().ok()?;
            let den = den.trim().parse().ok()?;
            return Some(Self { num, den });
        }
        s.parse().ok().map(|num| Self { num, den: 1 })
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Raw metadata as reported by a decoder probe.
///
/// Every field is optional: decoders differ in what they can report, and
/// [`ClipMetadata::from_probe`] is the single place that fills the gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbedMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub fps_rational: Option<FrameRate>,
    pub frame_count: Option<u64>,
    pub duration: Option<f64>,
}

/// Errors raised while normalizing probed metadata.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("Decoder reported no usable frame rate")]
    InvalidFrameRate,

    #[error("Decoder reported no usable dimensions ({width}x{height})")]
    MissingDimensions { width: u32, height: u32 },

    #[error("Decoder reported neither frame count nor duration")]
    UnknownLength,
}

/// Canonical clip metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipMetadata {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Exact frame rate when the decoder reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_rational: Option<FrameRate>,
    /// Total number of decodable frames
    pub frame_count: u64,
    /// Duration in seconds
    pub duration: f64,
    /// Lowercase source file extension (e.g. "braw")
    pub format: String,
    /// Name of the decode strategy that produced this metadata
    pub decoder: String,
}

/// Tolerance applied before rounding `duration * fps` up to a frame count.
const FRAME_COUNT_EPSILON: f64 = 1e-6;

impl ClipMetadata {
    /// Normalize a decoder probe into canonical metadata.
    ///
    /// - An exact rational frame rate wins over the float one.
    /// - With a frame count, duration is always `frame_count / fps`.
    /// - With only a duration, `frame_count = ceil(duration * fps)`.
    pub fn from_probe(
        probe: ProbedMetadata,
        format: impl Into<String>,
        decoder: impl Into<String>,
    ) -> Result<Self, MetadataError> {
        let fps = probe
            .fps_rational
            .and_then(|r| r.as_f64())
            .or(probe.fps)
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .ok_or(MetadataError::InvalidFrameRate)?;

        let width = probe.width.unwrap_or(0);
        let height = probe.height.unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(MetadataError::MissingDimensions { width, height });
        }

        let (frame_count, duration) = match (probe.frame_count, probe.duration) {
            (Some(count), _) => (count, count as f64 / fps),
            (None, Some(duration)) if duration.is_finite() && duration >= 0.0 => {
                let count = (duration * fps - FRAME_COUNT_EPSILON).ceil().max(0.0) as u64;
                (count, duration)
            }
            _ => return Err(MetadataError::UnknownLength),
        };

        Ok(Self {
            width,
            height,
            fps,
            fps_rational: probe.fps_rational.filter(|r| r.den != 0),
            frame_count,
            duration,
            format: format.into(),
            decoder: decoder.into(),
        })
    }

    /// Map a timestamp to a frame index of this clip.
    pub fn frame_index(&self, timestamp: f64) -> Option<u64> {
        frame_index_for(timestamp, self.fps, self.frame_count)
    }
}

/// Convert a timestamp to a zero-based frame index.
///
/// Computes `floor(timestamp * fps)` clamped to `[0, frame_count - 1]`, so
/// `+inf` lands on the last frame. NaN and negative timestamps clamp to
/// frame 0. Returns `None` only for clips without frames.
pub fn frame_index_for(timestamp: f64, fps: f64, frame_count: u64) -> Option<u64> {
    if frame_count == 0 {
        return None;
    }
    let last = frame_count - 1;
    if timestamp.is_nan() || timestamp <= 0.0 || !fps.is_finite() || fps <= 0.0 {
        return Some(0);
    }
    let raw = (timestamp * fps).floor();
    if raw >= last as f64 {
        Some(last)
    } else {
        Some(raw as u64)
    }
}
