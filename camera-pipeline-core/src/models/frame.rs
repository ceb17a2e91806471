use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format::Encoding;

/// Static description of the frames a completion port produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub encoding: Encoding,
}

/// Per-frame metadata stamped when the frame's last buffer completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Starts at 0 for each completion port.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: Encoding,
    pub captured_at: DateTime<Utc>,
    /// Presentation timestamp of the frame's last buffer, in microseconds.
    pub pts: Option<i64>,
}

/// A complete encoded (or raw) picture assembled from one or more buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Vec<u8>, info: FrameInfo, sequence: u64, pts: Option<i64>) -> Self {
        Self {
            data,
            metadata: FrameMetadata {
                sequence,
                width: info.width,
                height: info.height,
                encoding: info.encoding,
                captured_at: Utc::now(),
                pts,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
