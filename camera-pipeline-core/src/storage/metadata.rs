use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::PipelineError;
use crate::models::record::CaptureRecord;

/// Sidecar path for a capture file: its extension replaced by `metadata.json`.
pub fn metadata_path(capture_path: &Path) -> PathBuf {
    capture_path.with_extension("metadata.json")
}

/// Write capture metadata as a JSON sidecar file.
pub fn write_metadata(record: &CaptureRecord, capture_path: &Path) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| PipelineError::Storage(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(capture_path), json)
        .map_err(|e| PipelineError::Storage(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read capture metadata from a JSON sidecar file.
pub fn read_metadata(capture_path: &Path) -> Result<CaptureRecord, PipelineError> {
    let json = fs::read_to_string(metadata_path(capture_path))
        .map_err(|e| PipelineError::Storage(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| PipelineError::Storage(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_replaces_extension() {
        assert_eq!(
            metadata_path(Path::new("/tmp/capture.png")),
            PathBuf::from("/tmp/capture.metadata.json")
        );
    }

    #[test]
    fn metadata_survives_a_write_read_cycle() {
        let path = std::env::temp_dir().join("camera_pipeline_test_metadata.h264");
        let record = CaptureRecord::new(&path.to_string_lossy(), "abc123", Vec::new(), 0);

        write_metadata(&record, &path).unwrap();
        let read = read_metadata(&path).unwrap();
        assert_eq!(read, record);
        assert_eq!(read.frame_count, 0);
        assert!(read.encoding.is_none());

        fs::remove_file(metadata_path(&path)).ok();
    }

    #[test]
    fn missing_sidecar_is_a_storage_error() {
        let path = std::env::temp_dir().join("camera_pipeline_test_no_such_capture.png");
        assert!(matches!(read_metadata(&path), Err(PipelineError::Storage(_))));
    }
}
