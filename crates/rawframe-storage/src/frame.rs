//! Cached frame payload and its on-disk encoding.

use bytes::{Bytes, BytesMut};

use crate::error::{StorageError, StorageResult};

/// File magic for disk-tier payloads.
const MAGIC: &[u8; 4] = b"RFC1";
/// Magic + width + height.
pub const HEADER_LEN: usize = 12;

/// Encoded frame plus the dimensions it was rendered at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

impl CachedFrame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
        }
    }

    /// Accounted size: the payload length.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Serialize for the disk tier.
    pub(crate) fn to_file_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    /// Inverse of [`CachedFrame::to_file_bytes`].
    pub(crate) fn from_file_bytes(raw: Vec<u8>) -> StorageResult<Self> {
        if raw.len() < HEADER_LEN || &raw[..4] != MAGIC {
            return Err(StorageError::corrupt("bad frame header"));
        }
        let width = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let height = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let data = Bytes::from(raw).slice(HEADER_LEN..);
        Ok(Self {
            data,
            width,
            height,
        })
    }
}
