use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::SessionError;
use crate::models::recording_result::RecordingMetadata;

/// Sidecar path for a recording: `<prefix>.metadata.json`.
pub fn metadata_path(prefix: &Path) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(".metadata.json");
    PathBuf::from(path)
}

/// Write recording metadata as a JSON sidecar next to the per-body records.
pub fn write_metadata(metadata: &RecordingMetadata, prefix: &Path) -> Result<PathBuf, SessionError> {
    let path = metadata_path(prefix);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| SessionError::Storage(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json)
        .map_err(|e| SessionError::Storage(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

pub fn read_metadata(prefix: &Path) -> Result<RecordingMetadata, SessionError> {
    let json = fs::read_to_string(metadata_path(prefix))
        .map_err(|e| SessionError::Storage(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| SessionError::Storage(format!("failed to parse metadata: {}", e)))
}
