use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use camera_pipeline_core::storage::metadata::read_metadata;
use camera_pipeline_core::{
    CaptureSession, Encoding, FileSink, SessionConfiguration, SharedSink, StreamSink,
};
use camera_pipeline_virtual::VirtualDevice;

use crate::capture_state::{CaptureInfo, CaptureSummary, LogDelegate};
use crate::cli::OutputArgs;
use crate::still_files::{numbered_path, StillFilesSink};

const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn captures_dir() -> PathBuf {
    let dir = dirs_next::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("picam-sensor");
    fs::create_dir_all(&dir).ok();
    dir
}

fn timestamped_path(prefix: &str, encoding: Encoding) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    captures_dir().join(format!("{}_{}.{}", prefix, stamp, encoding.file_extension()))
}

/// Resolve the output flags into a sink and a description of where it writes.
///
/// More than one still into a file output becomes one numbered file per
/// still, since concatenated images are not viewable.
fn open_destination(
    output: &OutputArgs,
    prefix: &str,
    encoding: Encoding,
    stills: usize,
) -> (SharedSink, String) {
    if let Some(address) = &output.stream {
        let sink = StreamSink::new(address.clone()).with_connect_timeout(STREAM_CONNECT_TIMEOUT);
        return (Arc::new(Mutex::new(sink)), format!("tcp://{}", address));
    }
    let path = output
        .output
        .clone()
        .unwrap_or_else(|| timestamped_path(prefix, encoding));
    if stills > 1 {
        let description = format!(
            "{} .. {}",
            numbered_path(&path, 1).display(),
            numbered_path(&path, stills).display()
        );
        return (Arc::new(Mutex::new(StillFilesSink::new(path))), description);
    }
    let description = path.to_string_lossy().to_string();
    (Arc::new(Mutex::new(FileSink::new(path))), description)
}

fn new_session(
    config: &SessionConfiguration,
    sink: SharedSink,
    delegate: &Arc<LogDelegate>,
    raw_sink: Option<SharedSink>,
) -> Result<CaptureSession<VirtualDevice>, String> {
    let device = Arc::new(VirtualDevice::new());
    let mut session = CaptureSession::new(device, config.camera_num);
    session.set_delegate(delegate.clone());
    if let Some(raw) = raw_sink {
        session.set_raw_sink(raw);
    }
    session
        .start_pipeline(config, sink)
        .map_err(|e| format!("failed to start the pipeline: {}", e))?;
    Ok(session)
}

fn finish(
    mut session: CaptureSession<VirtualDevice>,
    delegate: &LogDelegate,
    destination: String,
) -> Result<(), String> {
    let pools = session.pool_stats();
    session.close();
    let summary = CaptureSummary {
        destination,
        frames: delegate.frames(),
        errors: delegate.errors(),
        diagnostics: session.diagnostics(),
        pools,
    };
    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

pub fn take_stills(
    config: SessionConfiguration,
    count: usize,
    output: &OutputArgs,
    raw: Option<PathBuf>,
) -> Result<(), String> {
    let encoding = config.encoder_policy().output_encoding();
    let (sink, destination) = open_destination(output, "still", encoding, count);
    let raw_sink = raw.map(|path| Arc::new(Mutex::new(FileSink::new(path))) as SharedSink);

    let delegate = LogDelegate::new();
    let mut session = new_session(&config, sink, &delegate, raw_sink)?;
    log::info!(
        "capturing {} still(s) at {} into {}",
        count,
        config.sensor_mode,
        destination
    );

    if let Err(e) = session.capture_stills(count, config.still_settle) {
        session.close();
        return Err(format!("still capture failed: {}", e));
    }
    finish(session, &delegate, destination)
}

pub fn record_video(config: SessionConfiguration, duration: u64, output: &OutputArgs) -> Result<(), String> {
    let (sink, destination) = open_destination(output, "video", Encoding::H264, 0);

    let delegate = LogDelegate::new();
    let mut session = new_session(&config, sink, &delegate, None)?;
    log::info!(
        "recording {}s at {} into {}",
        duration,
        config.sensor_mode,
        destination
    );

    if let Err(e) = session.record(Duration::from_secs(duration)) {
        session.close();
        return Err(format!("recording failed: {}", e));
    }
    finish(session, &delegate, destination)
}

pub fn list_captures() -> Result<(), String> {
    let captures = collect_captures(&captures_dir())?;
    let json = serde_json::to_string_pretty(&captures).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

/// Captures with a readable metadata sidecar, newest first.
fn collect_captures(dir: &Path) -> Result<Vec<CaptureInfo>, String> {
    let mut captures = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| e.to_string())?;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.ends_with(".json") {
            continue;
        }
        let Ok(record) = read_metadata(&path) else {
            continue;
        };
        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        captures.push(CaptureInfo::from_record(&record, name, size_bytes));
    }

    captures.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(captures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_pipeline_core::SensorMode;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("picam_sensor_test_{}", name));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn explicit_output_path_is_used() {
        let output = OutputArgs {
            output: Some(PathBuf::from("/tmp/picam_out.png")),
            stream: None,
        };
        let (_, destination) = open_destination(&output, "still", Encoding::Png, 1);
        assert_eq!(destination, "/tmp/picam_out.png");
    }

    #[test]
    fn stream_destination_is_described_as_tcp() {
        let output = OutputArgs {
            output: None,
            stream: Some("127.0.0.1:5000".into()),
        };
        let (sink, destination) = open_destination(&output, "still", Encoding::Png, 3);
        assert_eq!(destination, "tcp://127.0.0.1:5000");
        assert!(!sink.lock().is_open());
    }

    #[test]
    fn several_stills_are_described_as_numbered_files() {
        let output = OutputArgs {
            output: Some(PathBuf::from("/tmp/picam_burst.png")),
            stream: None,
        };
        let (_, destination) = open_destination(&output, "still", Encoding::Png, 3);
        assert_eq!(destination, "/tmp/picam_burst_001.png .. /tmp/picam_burst_003.png");
    }

    #[test]
    fn several_stills_land_in_separate_files() {
        let dir = temp_dir("burst");
        let config = SessionConfiguration {
            sensor_mode: SensorMode::Mode7,
            capture_timeout: Some(Duration::from_secs(10)),
            still_settle: Duration::ZERO,
            ..Default::default()
        };
        let output = OutputArgs {
            output: Some(dir.join("burst.png")),
            stream: None,
        };
        take_stills(config, 2, &output, None).unwrap();

        let mut captures = collect_captures(&dir).unwrap();
        captures.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        let names: Vec<&str> = captures.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, ["burst_001.png", "burst_002.png"]);
        assert!(captures.iter().all(|c| c.frame_count == 1));
        let first = fs::read(dir.join("burst_001.png")).unwrap();
        assert_eq!(&first[..8], b"\x89PNG\r\n\x1a\n");
        assert!(!dir.join("burst.png").exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn listing_reads_sidecars_and_skips_bare_files() {
        let dir = temp_dir("list");
        let config = SessionConfiguration {
            sensor_mode: SensorMode::Mode7,
            capture_timeout: Some(Duration::from_secs(10)),
            still_settle: Duration::ZERO,
            ..Default::default()
        };
        let output = OutputArgs {
            output: Some(dir.join("one.png")),
            stream: None,
        };
        take_stills(config, 1, &output, None).unwrap();
        fs::write(dir.join("stray.png"), b"not a capture").unwrap();

        let captures = collect_captures(&dir).unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].file_name, "one.png");
        assert_eq!(captures[0].frame_count, 1);
        assert_eq!(captures[0].checksum.len(), 64);
        fs::remove_dir_all(&dir).ok();
    }
}
