use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use camera_pipeline_core::{
    CaptureRecord, FrameMetadata, PipelineError, PipelineState, PoolStats, SessionDelegate,
    SessionDiagnostics,
};

/// SessionDelegate that reports pipeline events through the log.
pub struct LogDelegate {
    frames: AtomicU64,
    errors: AtomicU64,
}

impl LogDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl SessionDelegate for LogDelegate {
    fn on_state_changed(&self, state: &PipelineState) {
        match state {
            PipelineState::Failed(e) => log::error!("pipeline failed: {}", e),
            other => log::debug!("pipeline state: {:?}", other),
        }
    }

    fn on_frame_delivered(&self, metadata: &FrameMetadata) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "frame {}: {}x{} {} at {}",
            metadata.sequence,
            metadata.width,
            metadata.height,
            metadata.encoding,
            metadata.captured_at.to_rfc3339()
        );
    }

    fn on_error(&self, error: &PipelineError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        log::warn!("capture error: {}", error);
    }
}

/// Printed as JSON when a capture finishes.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    pub destination: String,
    pub frames: u64,
    pub errors: u64,
    pub diagnostics: SessionDiagnostics,
    pub pools: Vec<PoolStats>,
}

/// One entry of the `list` command.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureInfo {
    pub file_path: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub frame_count: u64,
    pub checksum: String,
    pub created_at: String,
}

impl CaptureInfo {
    pub fn from_record(record: &CaptureRecord, file_name: String, size_bytes: u64) -> Self {
        Self {
            file_path: record.file_path.clone(),
            file_name,
            size_bytes,
            frame_count: record.frame_count,
            checksum: record.checksum.clone(),
            created_at: record.created_at.clone(),
        }
    }
}
