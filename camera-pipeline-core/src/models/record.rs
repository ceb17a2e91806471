use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::format::Encoding;
use super::frame::FrameMetadata;

/// Result returned when a file sink is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub file_path: PathBuf,
    pub record: CaptureRecord,
}

/// Capture metadata written as a JSON sidecar next to the output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub encoding: Option<Encoding>,
    pub frame_count: u64,
    pub byte_count: u64,
    pub checksum: String,
    pub frames: Vec<FrameMetadata>,
}

impl CaptureRecord {
    pub fn new(file_path: &str, checksum: &str, frames: Vec<FrameMetadata>, byte_count: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            encoding: frames.first().map(|f| f.encoding),
            frame_count: frames.len() as u64,
            byte_count,
            checksum: checksum.to_string(),
            frames,
        }
    }
}
