//! Quality tiers and output representations for extracted frames.
//!
//! - `Low`: 640px wide, JPEG quality 60 (scrubbing previews)
//! - `Medium`: 1280px wide, JPEG quality 80 (viewer default)
//! - `High`: native resolution, JPEG quality 95 (grading reference)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Max output width for the low tier.
pub const LOW_MAX_WIDTH: u32 = 640;
/// Max output width for the medium tier.
pub const MEDIUM_MAX_WIDTH: u32 = 1280;

/// Requested frame quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// All available quality tiers.
    pub const ALL: &'static [Quality] = &[Quality::Low, Quality::Medium, Quality::High];

    /// Returns the tier name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }

    /// Maximum output width, `None` for native resolution.
    pub fn max_width(&self) -> Option<u32> {
        match self {
            Quality::Low => Some(LOW_MAX_WIDTH),
            Quality::Medium => Some(MEDIUM_MAX_WIDTH),
            Quality::High => None,
        }
    }

    /// JPEG encoder quality (1-100).
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            Quality::Low => 60,
            Quality::Medium => 80,
            Quality::High => 95,
        }
    }

    /// Output dimensions for a source of `width`x`height`.
    ///
    /// Preserves aspect ratio, never upscales, keeps both sides >= 1.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match self.max_width() {
            Some(max) if width > max && width > 0 => {
                let scaled = (height as u64 * max as u64 + width as u64 / 2) / width as u64;
                (max, (scaled as u32).max(1))
            }
            _ => (width, height),
        }
    }

    /// Stable one-byte tag used in cache key derivation.
    pub fn tag(&self) -> u8 {
        match self {
            Quality::Low => 1,
            Quality::Medium => 2,
            Quality::High => 3,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Quality {
    type Err = QualityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "preview" => Ok(Quality::Low),
            "medium" | "med" => Ok(Quality::Medium),
            "high" | "full" => Ok(Quality::High),
            _ => Err(QualityParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown quality tier: {0}")]
pub struct QualityParseError(String);

/// Representation of the bytes returned for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Baseline JPEG still.
    #[default]
    Jpeg,
    /// Interleaved 8-bit RGBA pixels, row-major, no header.
    Rgba,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Rgba => "rgba",
        }
    }

    /// MIME type for transport layers.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Rgba => "application/octet-stream",
        }
    }

    /// Stable one-byte tag used in cache key derivation.
    pub fn tag(&self) -> u8 {
        match self {
            OutputFormat::Jpeg => 1,
            OutputFormat::Rgba => 2,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "rgba" | "raw" => Ok(OutputFormat::Rgba),
            _ => Err(OutputFormatParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown output format: {0}")]
pub struct OutputFormatParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parse() {
        assert_eq!("low".parse::<Quality>().unwrap(), Quality::Low);
        assert_eq!("MEDIUM".parse::<Quality>().unwrap(), Quality::Medium);
        assert_eq!("full".parse::<Quality>().unwrap(), Quality::High);
        assert!("ultra".parse::<Quality>().is_err());
    }

    #[test]
    fn test_quality_display() {
        assert_eq!(Quality::Low.to_string(), "low");
        assert_eq!(Quality::default(), Quality::Medium);
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(Quality::Low.target_dimensions(6144, 3456), (640, 360));
        assert_eq!(Quality::Medium.target_dimensions(1920, 1080), (1280, 720));
        assert_eq!(Quality::High.target_dimensions(6144, 3456), (6144, 3456));
        // Never upscale
        assert_eq!(Quality::Medium.target_dimensions(800, 600), (800, 600));
        // Degenerate heights stay visible
        assert_eq!(Quality::Low.target_dimensions(10000, 1), (640, 1));
    }

    #[test]
    fn test_tags_are_distinct() {
        let tags: Vec<u8> = Quality::ALL.iter().map(|q| q.tag()).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_ne!(OutputFormat::Jpeg.tag(), OutputFormat::Rgba.tag());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("raw".parse::<OutputFormat>().unwrap(), OutputFormat::Rgba);
        assert!("png".parse::<OutputFormat>().is_err());
    }
}
