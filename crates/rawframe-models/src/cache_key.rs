//! Deterministic cache keys for extracted frames.
//!
//! Format: `{clip_digest}-{frame_digest}` where `clip_digest` is the first
//! 16 hex chars of SHA-256 over the clip id and `frame_digest` is the full
//! SHA-256 over a length-prefixed encoding of
//! `(clip id, timestamp bits, quality, output format)`.
//!
//! The clip prefix lets the disk tier attribute files to a clip without
//! consulting any index.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::clip::ClipId;
use crate::quality::{OutputFormat, Quality};

const FRAME_DOMAIN: &[u8] = b"rawframe/frame/v1\0";
const CLIP_DOMAIN: &[u8] = b"rawframe/clip/v1\0";

/// Length of the clip digest prefix in hex chars.
pub const CLIP_PREFIX_LEN: usize = 16;

/// File extension used for disk-tier payloads.
pub const FRAME_FILE_EXTENSION: &str = "frame";

/// Cache key for one (clip, timestamp, quality, format) request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    clip_id: ClipId,
    value: String,
}

impl CacheKey {
    /// Derive the key for a frame request.
    pub fn for_frame(
        clip_id: &ClipId,
        timestamp: f64,
        quality: Quality,
        format: OutputFormat,
    ) -> Self {
        // -0.0 and 0.0 address the same frame
        let timestamp = if timestamp == 0.0 { 0.0 } else { timestamp };
        let clip = clip_id.as_str().as_bytes();

        let mut hasher = Sha256::new();
        hasher.update(FRAME_DOMAIN);
        hasher.update((clip.len() as u64).to_le_bytes());
        hasher.update(clip);
        hasher.update(timestamp.to_bits().to_le_bytes());
        hasher.update([quality.tag(), format.tag()]);
        let frame_digest = hasher.finalize();

        Self {
            clip_id: clip_id.clone(),
            value: format!("{}-{:x}", Self::clip_prefix(clip_id), frame_digest),
        }
    }

    /// Digest prefix shared by every key of `clip_id`.
    pub fn clip_prefix(clip_id: &ClipId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(CLIP_DOMAIN);
        hasher.update(clip_id.as_str().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..CLIP_PREFIX_LEN].to_string()
    }

    /// Whether a raw key string belongs to `clip_id`.
    pub fn key_belongs_to(key: &str, clip_id: &ClipId) -> bool {
        let prefix = Self::clip_prefix(clip_id);
        key.len() > CLIP_PREFIX_LEN
            && key.starts_with(&prefix)
            && key.as_bytes()[CLIP_PREFIX_LEN] == b'-'
    }

    /// Check that a string has the shape of a key (used when scanning disk).
    pub fn is_valid_key(key: &str) -> bool {
        let Some((clip, frame)) = key.split_once('-') else {
            return false;
        };
        clip.len() == CLIP_PREFIX_LEN
            && frame.len() == 64
            && clip
                .chars()
                .chain(frame.chars())
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    /// The owning clip.
    pub fn clip_id(&self) -> &ClipId {
        &self.clip_id
    }

    /// The key string.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Disk-tier file name for this key.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.value, FRAME_FILE_EXTENSION)
    }

    /// Inverse of [`CacheKey::file_name`] for a raw key string.
    pub fn key_from_file_name(name: &str) -> Option<&str> {
        let key = name.strip_suffix(FRAME_FILE_EXTENSION)?.strip_suffix('.')?;
        Self::is_valid_key(key).then_some(key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(clip: &str, ts: f64, q: Quality, f: OutputFormat) -> CacheKey {
        CacheKey::for_frame(&ClipId::from(clip), ts, q, f)
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = key("clip1", 1.5, Quality::High, OutputFormat::Jpeg);
        let b = key("clip1", 1.5, Quality::High, OutputFormat::Jpeg);
        assert_eq!(a, b);
        assert!(CacheKey::is_valid_key(a.as_str()));
    }

    #[test]
    fn test_key_distinguishes_inputs() {
        let mut seen = HashSet::new();
        for clip in ["a", "ab", "b"] {
            for ts in [0.0, 0.5, 1.0] {
                for q in Quality::ALL {
                    for f in [OutputFormat::Jpeg, OutputFormat::Rgba] {
                        assert!(seen.insert(key(clip, ts, *q, f).as_str().to_string()));
                    }
                }
            }
        }
    }

    #[test]
    fn test_negative_zero_normalized() {
        assert_eq!(
            key("c", 0.0, Quality::Low, OutputFormat::Jpeg),
            key("c", -0.0, Quality::Low, OutputFormat::Jpeg)
        );
    }

    #[test]
    fn test_clip_attribution() {
        let clip = ClipId::from("clip-attr");
        let k = CacheKey::for_frame(&clip, 2.0, Quality::Medium, OutputFormat::Jpeg);
        assert!(CacheKey::key_belongs_to(k.as_str(), &clip));
        assert!(!CacheKey::key_belongs_to(k.as_str(), &ClipId::from("other")));
    }

    #[test]
    fn test_file_name_round_trip() {
        let k = key("clip", 3.0, Quality::Low, OutputFormat::Rgba);
        let name = k.file_name();
        assert!(name.ends_with(".frame"));
        assert_eq!(CacheKey::key_from_file_name(&name), Some(k.as_str()));
        assert_eq!(CacheKey::key_from_file_name("index.json"), None);
        assert_eq!(CacheKey::key_from_file_name(".tmp-abc.frame"), None);
    }
}
