use std::path::{Path, PathBuf};

use camera_pipeline_core::{FileSink, Frame, FrameSink, PipelineError};

/// Writes every frame to its own numbered file, `<stem>_001.<ext>` and so
/// on next to `base`, each with its own metadata sidecar.
pub struct StillFilesSink {
    base: PathBuf,
    written: Vec<PathBuf>,
    open: bool,
}

impl StillFilesSink {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            written: Vec::new(),
            open: false,
        }
    }

    /// Path of the `index`-th still, counting from 1.
    pub fn path_for(&self, index: usize) -> PathBuf {
        numbered_path(&self.base, index)
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// `dir/name.png` becomes `dir/name_NNN.png`.
pub fn numbered_path(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "still".into());
    let name = match base.extension() {
        Some(ext) => format!("{}_{:03}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{:03}", stem, index),
    };
    base.with_file_name(name)
}

impl FrameSink for StillFilesSink {
    fn open(&mut self) -> Result<(), PipelineError> {
        self.open = true;
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        if !self.open {
            return Err(PipelineError::Storage("still files are not open for writing".into()));
        }
        let path = self.path_for(self.written.len() + 1);
        let mut file = FileSink::new(&path);
        file.open()?;
        if let Err(e) = file.write_frame(frame) {
            file.close().ok();
            return Err(e);
        }
        file.close()?;
        log::debug!("still {} written to {}", frame.metadata.sequence, path.display());
        self.written.push(path);
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use camera_pipeline_core::models::frame::FrameInfo;
    use camera_pipeline_core::storage::metadata::{metadata_path, read_metadata};
    use camera_pipeline_core::Encoding;

    fn frame(data: &[u8], sequence: u64) -> Frame {
        let info = FrameInfo {
            width: 640,
            height: 480,
            encoding: Encoding::Png,
        };
        Frame::new(data.to_vec(), info, sequence, None)
    }

    #[test]
    fn numbering_keeps_directory_and_extension() {
        assert_eq!(
            numbered_path(Path::new("/tmp/shots/garden.png"), 2),
            PathBuf::from("/tmp/shots/garden_002.png")
        );
        assert_eq!(numbered_path(Path::new("raw"), 12), PathBuf::from("raw_012"));
    }

    #[test]
    fn each_frame_gets_its_own_file() {
        let dir = std::env::temp_dir().join("picam_sensor_test_still_files");
        fs::remove_dir_all(&dir).ok();
        let mut sink = StillFilesSink::new(dir.join("shot.png"));
        sink.open().unwrap();
        sink.write_frame(&frame(b"first", 0)).unwrap();
        sink.write_frame(&frame(b"second", 1)).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.written().len(), 2);
        assert_eq!(fs::read(dir.join("shot_001.png")).unwrap(), b"first");
        assert_eq!(fs::read(dir.join("shot_002.png")).unwrap(), b"second");
        let record = read_metadata(&dir.join("shot_002.png")).unwrap();
        assert_eq!(record.frame_count, 1);
        assert!(metadata_path(&dir.join("shot_001.png")).exists());
        assert!(!dir.join("shot.png").exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_before_open_fails() {
        let mut sink = StillFilesSink::new(std::env::temp_dir().join("picam_unopened.png"));
        assert!(matches!(
            sink.write_frame(&frame(b"x", 0)),
            Err(PipelineError::Storage(_))
        ));
    }
}
