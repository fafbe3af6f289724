//! Local filesystem helpers.

use crate::error::TransferError;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Creates `path` and all of its parents. Safe to call concurrently for the same path.
pub async fn ensure_directory_exists(path: &Path) -> io::Result<()> {
    if path.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty path provided",
        ));
    }
    tokio::fs::create_dir_all(path).await
}

/// Whether anything exists at `path`.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Maps a remote key to its path below `root`.
///
/// Leading slashes are ignored. Every other segment must be a plain name:
/// empty, `.` and `..` segments are rejected, so no key escapes `root` and no
/// two distinct keys share a local file.
pub fn resolve_local_path(root: &Path, key: &str) -> Result<PathBuf, TransferError> {
    let invalid = || TransferError::InvalidKey {
        key: key.to_string(),
    };
    let relative = key.trim_start_matches('/');
    if relative.is_empty() {
        return Err(invalid());
    }

    let mut path = root.to_path_buf();
    for segment in relative.split('/') {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == segment => path.push(part),
            _ => return Err(invalid()),
        }
    }
    Ok(path)
}
