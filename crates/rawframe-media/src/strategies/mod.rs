//! Concrete decode strategies.

mod helper;
mod native;
mod raw_still;
mod transcoder;

pub use helper::HelperProcessStrategy;
pub use native::{BrawSdk, NativeSdkStrategy, SdkClipInfo, SdkFrame};
pub use raw_still::RawStillStrategy;
pub use transcoder::TranscoderStrategy;

use crate::error::{MediaError, MediaResult};

/// Reject frame indices past the end of the clip.
pub(crate) fn check_frame_range(frame_index: u64, frame_count: u64) -> MediaResult<()> {
    if frame_index >= frame_count {
        return Err(MediaError::FrameOutOfRange {
            frame: frame_index,
            last: frame_count.saturating_sub(1),
        });
    }
    Ok(())
}
