//! Filesystem helpers for report and artifact outputs.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

use crate::error::MediaResult;

/// Write `contents` to `path` via a sibling temp file and a rename, so
/// readers never observe a half-written file.
pub async fn write_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> MediaResult<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_sibling(path);
    if let Err(e) = fs::write(&tmp, contents.as_ref()).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> MediaResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, json).await
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Size of a file in bytes, `None` when it does not exist.
pub async fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path).await.ok().map(|m| m.len())
}
