//! Local video storage.
//!
//! Uploaded videos live in the upload folder only while a request is being
//! processed. Demo videos are read in place and never removed.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::constants::ALLOWED_EXTENSIONS;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid file name: {0}")]
    InvalidName(String),
    #[error("demo video not found: {0}")]
    NotFound(String),
}

/// Whether `filename` ends in one of the accepted container extensions.
pub fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_` and anything outside
/// `[A-Za-z0-9._-]` is removed. `None` if nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Write an uploaded video under `upload_dir` with a timestamp prefix.
pub async fn save_upload(
    upload_dir: &Path,
    original_name: &str,
    data: &Bytes,
) -> Result<PathBuf, StorageError> {
    let safe_name = sanitize_filename(original_name)
        .ok_or_else(|| StorageError::InvalidName(original_name.to_string()))?;

    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(format!("{}_{}", Utc::now().timestamp_millis(), safe_name));
    tokio::fs::write(&path, data).await?;

    log::info!("[storage] Saved {} bytes to {:?}", data.len(), path);
    Ok(path)
}

/// Delete a processed upload. Failures are logged and otherwise ignored.
pub async fn remove_best_effort(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("[storage] Failed to remove {:?}: {}", path, e);
    }
}

/// Locate a demo video by bare file name.
pub async fn resolve_demo(demo_dir: &Path, name: &str) -> Result<PathBuf, StorageError> {
    if sanitize_filename(name).as_deref() != Some(name) || !has_allowed_extension(name) {
        return Err(StorageError::InvalidName(name.to_string()));
    }

    let path = demo_dir.join(name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        Ok(_) => Err(StorageError::NotFound(name.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::NotFound(name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Demo videos available for analysis, sorted by name. A missing folder
/// simply means there are none.
pub async fn list_demo_videos(demo_dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match tokio::fs::read_dir(demo_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if has_allowed_extension(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
