use crate::error::IngestError;
use crate::models::DocumentMetadata;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const UNKNOWN_MANUAL: &str = "Unknown Manual";

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `<dir>/<stem><suffix>` next to `path`.
pub fn sibling_path(path: &Path, suffix: &str) -> Result<PathBuf, IngestError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
    Ok(path.with_file_name(format!("{stem}{suffix}")))
}

/// Metadata file that belongs to a chunk file: `x_chunked.json` -> `x_meta.json`.
pub fn meta_path_for_chunks(chunk_path: &Path) -> Result<PathBuf, IngestError> {
    let name = chunk_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(chunk_path.display().to_string()))?;

    let meta_name = match name.strip_suffix("_chunked.json") {
        Some(stem) => format!("{stem}_meta.json"),
        None => return sibling_path(chunk_path, "_meta.json"),
    };
    Ok(chunk_path.with_file_name(meta_name))
}

pub fn save_metadata(metadata: &DocumentMetadata, path: &Path) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(metadata)?)?;
    tracing::info!(path = %path.display(), "wrote metadata");
    Ok(())
}

/// Reads a metadata file. A missing file is an error; unparsable JSON falls
/// back to empty metadata. The flag reports whether metadata was found.
pub fn read_metadata(path: &Path) -> Result<(DocumentMetadata, bool), IngestError> {
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str::<DocumentMetadata>(raw.trim()) {
        Ok(metadata) => Ok((metadata, true)),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "metadata is not valid json, using empty metadata");
            Ok((DocumentMetadata::default(), false))
        }
    }
}

pub fn manual_title(metadata: &DocumentMetadata) -> String {
    metadata
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNKNOWN_MANUAL)
        .to_string()
}
