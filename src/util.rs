//! Shared utility functions.

use std::fs;
use std::path::Path;

use tokio::task::spawn_blocking;
use uuid::Uuid;

use crate::{Error, Result};

pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Write `contents` to `path` only if nothing is there yet.
///
/// The data lands in a uniquely named sibling first and is hard-linked into
/// place, so readers never see a partial file and a concurrent writer gets
/// `ErrorKind::AlreadyExists`.
pub fn write_new(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    fs::write(&temp_path, contents)?;
    let linked = fs::hard_link(&temp_path, path);
    fs::remove_file(&temp_path)?;
    linked?;
    Ok(())
}

/// Rough token estimate used for checkpoint accounting.
pub fn approx_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
