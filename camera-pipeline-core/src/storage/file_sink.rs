use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::PipelineError;
use crate::models::frame::{Frame, FrameMetadata};
use crate::models::record::{CaptureRecord, CaptureResult};
use crate::traits::frame_sink::FrameSink;

use super::metadata;

/// Appends every frame to one file.
///
/// The first open truncates the file; reopening after a close appends, and
/// the record keeps every frame written since the first open. On close the
/// file is flushed, a SHA-256 checksum computed, and a [`CaptureRecord`]
/// written alongside it as `<name>.metadata.json`.
///
/// ## File Format
///
/// ```text
/// [frame 0 payload][frame 1 payload]...
/// ```
/// For H.264 the concatenation is a playable Annex B elementary stream.
pub struct FileSink {
    file_path: PathBuf,
    file: Option<File>,
    frames: Vec<FrameMetadata>,
    bytes_written: u64,
    started: bool,
    result: Option<CaptureResult>,
}

impl FileSink {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            file: None,
            frames: Vec::new(),
            bytes_written: 0,
            started: false,
            result: None,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Outcome of the most recent close.
    pub fn result(&self) -> Option<&CaptureResult> {
        self.result.as_ref()
    }
}

impl FrameSink for FileSink {
    fn open(&mut self) -> Result<(), PipelineError> {
        if self.file.is_some() {
            self.close()?;
        }

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::Storage(format!("failed to create directory: {}", e)))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.started)
            .truncate(!self.started)
            .open(&self.file_path)
            .map_err(|e| PipelineError::Storage(format!("failed to open file: {}", e)))?;
        self.file = Some(file);
        if self.started {
            log::info!(
                "appending frames to {} after {} bytes",
                self.file_path.display(),
                self.bytes_written
            );
        } else {
            log::info!("writing frames to {}", self.file_path.display());
        }
        self.started = true;
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PipelineError::Storage("file is not open for writing".into()))?;
        file.write_all(&frame.data)
            .map_err(|e| PipelineError::Storage(format!("write failed: {}", e)))?;
        self.bytes_written += frame.data.len() as u64;
        self.frames.push(frame.metadata.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush()
            .map_err(|e| PipelineError::Storage(format!("flush failed: {}", e)))?;
        drop(file);

        let checksum = sha256_file(&self.file_path)?;
        let record = CaptureRecord::new(
            &self.file_path.to_string_lossy(),
            &checksum,
            self.frames.clone(),
            self.bytes_written,
        );
        metadata::write_metadata(&record, &self.file_path)?;
        log::info!(
            "closed {}: {} frames, {} bytes",
            self.file_path.display(),
            record.frame_count,
            record.byte_count
        );

        self.result = Some(CaptureResult {
            file_path: self.file_path.clone(),
            record,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, PipelineError> {
    let data = fs::read(path)
        .map_err(|e| PipelineError::Storage(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::Encoding;
    use crate::models::frame::FrameInfo;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camera_pipeline_test_{}", name))
    }

    fn frame(data: &[u8], sequence: u64) -> Frame {
        let info = FrameInfo {
            width: 1920,
            height: 1080,
            encoding: Encoding::Png,
        };
        Frame::new(data.to_vec(), info, sequence, Some(sequence as i64 * 1000))
    }

    #[test]
    fn frames_are_appended_and_recorded() {
        let path = temp_file_path("append.png");
        let mut sink = FileSink::new(&path);
        sink.open().unwrap();
        sink.write_frame(&frame(b"first", 0)).unwrap();
        sink.write_frame(&frame(b"second", 1)).unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"firstsecond");

        let result = sink.result().unwrap();
        assert_eq!(result.record.frame_count, 2);
        assert_eq!(result.record.byte_count, 11);
        assert_eq!(result.record.encoding, Some(Encoding::Png));
        assert_eq!(result.record.checksum.len(), 64);

        let sidecar = metadata::read_metadata(&path).unwrap();
        assert_eq!(sidecar, result.record);
        assert_eq!(sidecar.frames[1].sequence, 1);

        fs::remove_file(&path).ok();
        fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn checksum_is_sha256_of_contents() {
        let path = temp_file_path("checksum.bin");
        let mut sink = FileSink::new(&path);
        sink.open().unwrap();
        sink.write_frame(&frame(b"abc", 0)).unwrap();
        sink.close().unwrap();

        assert_eq!(
            sink.result().unwrap().record.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        fs::remove_file(&path).ok();
        fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn close_without_open_is_a_no_op() {
        let mut sink = FileSink::new(temp_file_path("never_opened.png"));
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(!sink.is_open());
        assert!(sink.result().is_none());
    }

    #[test]
    fn second_open_closes_the_first_file() {
        let path = temp_file_path("reopen.png");
        let mut sink = FileSink::new(&path);
        sink.open().unwrap();
        sink.write_frame(&frame(b"one", 0)).unwrap();
        sink.open().unwrap();
        assert!(sink.is_open());
        assert_eq!(sink.result().unwrap().record.frame_count, 1);
        sink.write_frame(&frame(b"two", 1)).unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"onetwo");
        assert_eq!(sink.result().unwrap().record.frame_count, 2);

        fs::remove_file(&path).ok();
        fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn reopening_appends_to_the_capture() {
        let path = temp_file_path("reopen_append.png");
        fs::write(&path, b"stale").unwrap();

        let mut sink = FileSink::new(&path);
        sink.open().unwrap();
        sink.write_frame(&frame(b"first", 0)).unwrap();
        sink.close().unwrap();
        sink.open().unwrap();
        sink.write_frame(&frame(b"second", 1)).unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"firstsecond");
        let sidecar = metadata::read_metadata(&path).unwrap();
        assert_eq!(sidecar.frame_count, 2);
        assert_eq!(sidecar.byte_count, 11);
        assert_eq!(sidecar.frames[0].sequence, 0);
        assert_eq!(sidecar.frames[1].sequence, 1);
        assert_eq!(sink.bytes_written(), 11);

        fs::remove_file(&path).ok();
        fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn write_before_open_fails() {
        let mut sink = FileSink::new(temp_file_path("closed.png"));
        assert!(matches!(
            sink.write_frame(&frame(b"x", 0)),
            Err(PipelineError::Storage(_))
        ));
    }
}
