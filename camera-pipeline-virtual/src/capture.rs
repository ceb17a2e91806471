use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camera_pipeline_core::models::component::PortRef;
use camera_pipeline_core::models::error::PipelineError;
use camera_pipeline_core::models::params::{Parameter, ParameterId};
use camera_pipeline_core::pool::buffer::{Buffer, BufferFlags};
use camera_pipeline_core::traits::device::BufferCallback;

use crate::device::Shared;
use crate::payload;
use crate::state::Target;

const BUFFER_POLL: Duration = Duration::from_millis(100);
const PACE_STEP: Duration = Duration::from_millis(5);

/// A thread producing frames for one camera capture port.
pub(crate) struct CaptureWorker {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureWorker {
    /// Start producing frames from `port`. A one-shot worker stops after
    /// one frame and clears the port's capture flag.
    pub fn spawn(shared: Arc<Shared>, port: PortRef, one_shot: bool) -> Result<Self, PipelineError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_shared = Arc::clone(&shared);
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("virtual-camera-capture".into())
            .spawn(move || {
                capture_loop(&thread_shared, port, &thread_running, one_shot);
                thread_running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                PipelineError::ResourceExhausted(format!("failed to spawn capture thread: {}", e))
            })?;

        Ok(Self {
            shared,
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.shared.buffer_ready.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("virtual capture thread panicked");
            }
        }
    }
}

fn capture_loop(shared: &Shared, port: PortRef, running: &AtomicBool, one_shot: bool) {
    log::debug!("{}: capture started", port);
    while running.load(Ordering::SeqCst) {
        let plan = shared.state.lock().plan_frame(port);
        let plan = match plan {
            Ok(plan) => plan,
            Err(reason) => {
                log::warn!("{}: no frame produced: {}", port, reason);
                break;
            }
        };

        let started = Instant::now();
        let pts = plan.sequence as i64 * plan.interval.as_micros() as i64;
        for target in &plan.targets {
            let data = payload::synthesize(target.encoding, target.width, target.height, plan.sequence);
            let keyframe = payload::is_keyframe(target.encoding, plan.sequence);
            if !deliver(shared, target, &data, pts, keyframe, plan.corrupt, running) {
                log::debug!("{}: frame {} cut short", target.port, plan.sequence);
            }
        }
        log::trace!("{}: frame {} produced", port, plan.sequence);

        if one_shot {
            let mut state = shared.state.lock();
            state
                .parameters
                .insert((port, ParameterId::Capture), Parameter::Capture(false));
            break;
        }
        pace(plan.interval.saturating_sub(started.elapsed()), running);
    }
    log::debug!("{}: capture stopped", port);
}

/// Split `data` across the port's queued buffers and complete each one.
/// Returns false if the port went away before the frame was finished.
fn deliver(
    shared: &Shared,
    target: &Target,
    data: &[u8],
    pts: i64,
    keyframe: bool,
    corrupt: bool,
    running: &AtomicBool,
) -> bool {
    let mut offset = 0;
    while offset < data.len() {
        let Some((mut buffer, callback)) = next_buffer(shared, target.port, running) else {
            return false;
        };
        let start = offset;
        offset += buffer.fill(&data[offset..]);

        let mut flags = BufferFlags::NONE;
        if start == 0 {
            flags |= BufferFlags::FRAME_START;
            if keyframe {
                flags |= BufferFlags::KEYFRAME;
            }
        }
        if offset >= data.len() {
            flags |= if corrupt {
                BufferFlags::TRANSMISSION_FAILED
            } else {
                BufferFlags::FRAME_END
            };
        }
        buffer.flags = flags;
        buffer.pts = Some(pts);
        callback(buffer);
    }
    true
}

/// Wait for a buffer the host has sent to `port`.
fn next_buffer(shared: &Shared, port: PortRef, running: &AtomicBool) -> Option<(Buffer, BufferCallback)> {
    let mut state = shared.state.lock();
    loop {
        let slot = state.port_mut(port).ok()?;
        if !slot.enabled {
            return None;
        }
        let callback = slot.callback.clone()?;
        if let Some(buffer) = slot.queue.pop_front() {
            return Some((buffer, callback));
        }
        // Queued buffers still drain after a stop so a started frame completes.
        if !running.load(Ordering::SeqCst) {
            return None;
        }
        shared.buffer_ready.wait_for(&mut state, BUFFER_POLL);
    }
}

fn pace(delay: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(PACE_STEP.min(deadline - now));
    }
}
