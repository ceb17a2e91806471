use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::PipelineError;
use crate::models::frame::FrameMetadata;

#[derive(Default)]
struct Captured {
    count: u64,
    last: Option<FrameMetadata>,
}

/// Wakes the controller when the completion thread finishes a frame.
#[derive(Default)]
pub struct FrameSignal {
    captured: Mutex<Captured>,
    cond: Condvar,
}

impl FrameSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, metadata: &FrameMetadata) {
        let mut captured = self.captured.lock();
        captured.count += 1;
        captured.last = Some(metadata.clone());
        self.cond.notify_all();
    }

    /// Frames signalled so far.
    pub fn count(&self) -> u64 {
        self.captured.lock().count
    }

    /// Block until more than `seen` frames have been signalled and return
    /// the newest frame's metadata. `None` waits indefinitely.
    pub fn wait_past(&self, seen: u64, timeout: Option<Duration>) -> Result<FrameMetadata, PipelineError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut captured = self.captured.lock();
        while captured.count <= seen {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut captured, deadline).timed_out() && captured.count <= seen {
                        return Err(PipelineError::Timeout(format!(
                            "frame {} after {:?}",
                            seen + 1,
                            timeout.unwrap_or_default()
                        )));
                    }
                }
                None => self.cond.wait(&mut captured),
            }
        }
        captured
            .last
            .clone()
            .ok_or_else(|| PipelineError::InvalidState("frame signalled without metadata".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;

    use crate::models::format::Encoding;

    fn metadata(sequence: u64) -> FrameMetadata {
        FrameMetadata {
            sequence,
            width: 640,
            height: 480,
            encoding: Encoding::Png,
            captured_at: Utc::now(),
            pts: None,
        }
    }

    #[test]
    fn wait_returns_once_a_new_frame_arrives() {
        let signal = Arc::new(FrameSignal::new());
        let notifier = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify(&metadata(0));
        });

        let meta = signal.wait_past(0, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(meta.sequence, 0);
        assert_eq!(signal.count(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn already_signalled_frame_returns_immediately() {
        let signal = FrameSignal::new();
        signal.notify(&metadata(0));
        signal.notify(&metadata(1));
        let meta = signal.wait_past(1, None).unwrap();
        assert_eq!(meta.sequence, 1);
    }

    #[test]
    fn wait_times_out() {
        let signal = FrameSignal::new();
        let result = signal.wait_past(0, Some(Duration::from_millis(10)));
        assert!(matches!(result, Err(PipelineError::Timeout(_))));
    }
}
