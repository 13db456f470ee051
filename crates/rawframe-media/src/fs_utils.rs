//! Moving uploaded clips into the source directory.
//!
//! Uploads often land on a different filesystem (a tmpfs or a mounted
//! volume) than the clip store, so a plain rename can fail with EXDEV.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Linux/macOS errno for cross-device links.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, falling back to copy + delete across devices.
///
/// The destination never exists in a partially written state: the copy goes
/// to a sibling temp file that is renamed into place.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !fs::try_exists(src).await? {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device move, copying"
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Sibling path used while copying into `dst`.
fn partial_path(dst: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dst.file_name().unwrap_or_default());
    name.push(".partial");
    dst.with_file_name(name)
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    let partial = partial_path(dst);

    if let Err(e) = fs::copy(src, &partial).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    // The clip is in place; a leftover source only wastes space
    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "Failed to remove source after copy");
    }

    Ok(())
}
