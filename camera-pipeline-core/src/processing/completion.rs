use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::component::PortRef;
use crate::models::diagnostics::SessionDiagnostics;
use crate::models::error::PipelineError;
use crate::models::frame::{Frame, FrameInfo};
use crate::pool::buffer::Buffer;
use crate::pool::buffer_pool::BufferPool;
use crate::traits::device::{BufferCallback, BufferTransport};
use crate::traits::frame_sink::SharedSink;
use crate::traits::session_delegate::SessionDelegate;

use super::frame_assembler::{AssemblyOutcome, FrameAssembler};
use super::frame_signal::FrameSignal;

/// Everything a completion callback needs for one pool-bound port.
///
/// The device's callback holds an `Arc` to this context, so the context
/// outlives every buffer in flight on the port. The session keeps its own
/// `Arc` and clears `enabled` before asking the device to disable the port.
pub struct CompletionContext {
    port: PortRef,
    pool: BufferPool,
    transport: Arc<dyn BufferTransport>,
    enabled: AtomicBool,
    assembler: Mutex<FrameAssembler>,
    info: FrameInfo,
    sequence: AtomicU64,
    sink: Option<SharedSink>,
    signal: Option<Arc<FrameSignal>>,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl CompletionContext {
    pub fn new(
        pool: BufferPool,
        transport: Arc<dyn BufferTransport>,
        info: FrameInfo,
        diagnostics: Arc<Mutex<SessionDiagnostics>>,
    ) -> Self {
        Self {
            port: pool.port(),
            pool,
            transport,
            enabled: AtomicBool::new(false),
            assembler: Mutex::new(FrameAssembler::new()),
            info,
            sequence: AtomicU64::new(0),
            sink: None,
            signal: None,
            diagnostics,
            delegate: None,
        }
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Wake waiters on `signal` for every delivered frame.
    pub fn with_signal(mut self, signal: Arc<FrameSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn port(&self) -> PortRef {
        self.port
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn sink(&self) -> Option<&SharedSink> {
        self.sink.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Callback to register with the device for this port.
    pub fn callback(self: &Arc<Self>) -> BufferCallback {
        let context = Arc::clone(self);
        Arc::new(move |buffer: Buffer| context.on_buffer_complete(buffer))
    }

    /// Mark the port live and send it every buffer the pool holds.
    ///
    /// Returns how many buffers were sent. A buffer the device refuses goes
    /// back to the pool and the refusal is returned.
    pub fn prime(&self) -> Result<usize, PipelineError> {
        self.enabled.store(true, Ordering::SeqCst);
        let mut sent = 0;
        for _ in 0..self.pool.buffer_num() {
            let Some(buffer) = self.pool.get() else {
                break;
            };
            if let Err(rejected) = self.transport.send_buffer(self.port, buffer) {
                self.return_to_pool(rejected.buffer);
                return Err(rejected.error);
            }
            sent += 1;
        }
        log::debug!("{}: primed with {} buffers", self.port, sent);
        Ok(sent)
    }

    /// Stop re-arming. Buffers completing after this go straight back to
    /// the pool.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Throw away a frame left half-assembled when the port shut down.
    pub fn discard_partial(&self) -> usize {
        let bytes = self.assembler.lock().reset();
        if bytes > 0 {
            self.diagnostics.lock().bytes_discarded += bytes as u64;
            log::debug!("{}: discarded {} bytes of an unfinished frame", self.port, bytes);
        }
        bytes
    }

    /// Handle one buffer the device has finished with.
    ///
    /// Runs on the device's completion thread.
    pub fn on_buffer_complete(&self, buffer: Buffer) {
        log::trace!(
            "{}: buffer {} complete, {} bytes, flags {}",
            self.port,
            buffer.id(),
            buffer.length,
            buffer.flags
        );
        self.diagnostics.lock().buffers_completed += 1;

        let pts = buffer.pts;
        let outcome = self.assembler.lock().push(&buffer);
        match outcome {
            AssemblyOutcome::Complete(data) => self.deliver(data, pts),
            AssemblyOutcome::Discarded { bytes } => {
                {
                    let mut diag = self.diagnostics.lock();
                    diag.transmission_failures += 1;
                    diag.bytes_discarded += bytes as u64;
                }
                log::warn!("{}: transmission failed, dropped {} bytes", self.port, bytes);
                self.report(&PipelineError::TransmissionFailed);
            }
            AssemblyOutcome::Pending => {}
        }

        self.return_to_pool(buffer);

        if self.enabled.load(Ordering::SeqCst) {
            self.rearm();
        }
    }

    fn deliver(&self, data: Vec<u8>, pts: Option<i64>) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let frame = Frame::new(data, self.info, sequence, pts);

        let written = match &self.sink {
            Some(sink) => sink.lock().write_frame(&frame),
            None => Ok(()),
        };

        match written {
            Ok(()) => {
                let mut diag = self.diagnostics.lock();
                diag.frames_delivered += 1;
                diag.bytes_delivered += frame.len() as u64;
            }
            Err(e) => {
                self.diagnostics.lock().sink_errors += 1;
                log::error!("{}: failed to write frame {}: {}", self.port, sequence, e);
                self.report(&e);
            }
        }

        log::debug!("{}: frame {} complete, {} bytes", self.port, sequence, frame.len());
        if let Some(signal) = &self.signal {
            signal.notify(&frame.metadata);
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_frame_delivered(&frame.metadata);
        }
    }

    fn rearm(&self) {
        let Some(buffer) = self.pool.get() else {
            log::warn!("{}: no buffer available to re-arm", self.port);
            return;
        };
        if let Err(rejected) = self.transport.send_buffer(self.port, buffer) {
            self.diagnostics.lock().rearm_failures += 1;
            log::warn!("{}: failed to re-arm: {}", self.port, rejected.error);
            self.return_to_pool(rejected.buffer);
            self.report(&rejected.error);
        }
    }

    fn return_to_pool(&self, buffer: Buffer) {
        if let Err(rejected) = self.pool.release(buffer) {
            log::warn!("{}: {}", self.port, rejected.error);
        }
    }

    fn report(&self, error: &PipelineError) {
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::component::ComponentHandle;
    use crate::models::format::Encoding;
    use crate::pool::buffer::{BufferFlags, RejectedBuffer};
    use crate::traits::frame_sink::FrameSink;

    /// Holds sent buffers until the test completes them.
    #[derive(Default)]
    struct QueueTransport {
        held: Mutex<Vec<Buffer>>,
        refuse: AtomicBool,
    }

    impl QueueTransport {
        fn take(&self) -> Option<Buffer> {
            let mut held = self.held.lock();
            if held.is_empty() {
                None
            } else {
                Some(held.remove(0))
            }
        }

        fn held(&self) -> usize {
            self.held.lock().len()
        }
    }

    impl BufferTransport for QueueTransport {
        fn send_buffer(&self, _port: PortRef, buffer: Buffer) -> Result<(), RejectedBuffer> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(RejectedBuffer::new(
                    buffer,
                    PipelineError::InvalidState("port disabled".into()),
                ));
            }
            self.held.lock().push(buffer);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        frames: Vec<Vec<u8>>,
        open: bool,
    }

    impl FrameSink for MemorySink {
        fn open(&mut self) -> Result<(), PipelineError> {
            self.open = true;
            Ok(())
        }

        fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
            self.frames.push(frame.data.clone());
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

    struct Fixture {
        transport: Arc<QueueTransport>,
        sink: Arc<Mutex<MemorySink>>,
        signal: Arc<FrameSignal>,
        diagnostics: Arc<Mutex<SessionDiagnostics>>,
        context: Arc<CompletionContext>,
    }

    fn fixture(buffer_num: u32) -> Fixture {
        let pool = BufferPool::new(PortRef::output(ComponentHandle(2), 0), buffer_num, 16).unwrap();
        let transport = Arc::new(QueueTransport::default());
        let sink = Arc::new(Mutex::new(MemorySink::default()));
        let signal = Arc::new(FrameSignal::new());
        let diagnostics = Arc::new(Mutex::new(SessionDiagnostics::default()));
        let info = FrameInfo {
            width: 1920,
            height: 1080,
            encoding: Encoding::Jpeg,
        };
        let shared: SharedSink = sink.clone();
        let context = Arc::new(
            CompletionContext::new(pool, transport.clone(), info, Arc::clone(&diagnostics))
                .with_sink(shared)
                .with_signal(Arc::clone(&signal)),
        );
        Fixture {
            transport,
            sink,
            signal,
            diagnostics,
            context,
        }
    }

    fn complete(fx: &Fixture, bytes: &[u8], flags: BufferFlags) {
        let mut buffer = fx.transport.take().expect("a buffer is queued on the port");
        buffer.fill(bytes);
        buffer.flags = flags;
        (fx.context.callback())(buffer);
    }

    #[test]
    fn prime_sends_every_pooled_buffer() {
        let fx = fixture(3);
        assert_eq!(fx.context.prime().unwrap(), 3);
        assert_eq!(fx.transport.held(), 3);
        assert_eq!(fx.context.pool().available(), 0);
    }

    #[test]
    fn refused_prime_returns_buffer_to_pool() {
        let fx = fixture(3);
        fx.transport.refuse.store(true, Ordering::SeqCst);
        assert!(fx.context.prime().is_err());
        assert_eq!(fx.context.pool().available(), 3);
    }

    #[test]
    fn completions_reassemble_and_rearm() {
        let fx = fixture(2);
        fx.context.prime().unwrap();

        complete(&fx, b"AB", BufferFlags::FRAME_START);
        complete(&fx, b"CD", BufferFlags::NONE);
        complete(&fx, b"EF", BufferFlags::NONE);
        complete(&fx, b"GH", BufferFlags::FRAME_END);

        assert_eq!(fx.sink.lock().frames, vec![b"ABCDEFGH".to_vec()]);
        assert_eq!(fx.signal.count(), 1);
        assert_eq!(fx.transport.held(), 2);

        let diag = fx.diagnostics.lock().clone();
        assert_eq!(diag.buffers_completed, 4);
        assert_eq!(diag.frames_delivered, 1);
        assert_eq!(diag.bytes_delivered, 8);
    }

    #[test]
    fn empty_frame_end_still_signals() {
        let fx = fixture(2);
        fx.context.prime().unwrap();

        complete(&fx, b"", BufferFlags::FRAME_END);

        assert_eq!(fx.signal.count(), 1);
        assert_eq!(fx.sink.lock().frames, vec![Vec::<u8>::new()]);
        assert_eq!(fx.diagnostics.lock().frames_delivered, 1);
        assert_eq!(fx.transport.held(), 2);
    }

    #[test]
    fn buffers_are_conserved_over_many_completions() {
        let fx = fixture(3);
        fx.context.prime().unwrap();
        for i in 0..50 {
            let flags = if i % 5 == 4 { BufferFlags::FRAME_END } else { BufferFlags::NONE };
            complete(&fx, b"xy", flags);
            let stats = fx.context.pool().stats();
            assert!(stats.is_conserved());
            assert_eq!(stats.in_flight, 3);
        }
        assert_eq!(fx.sink.lock().frames.len(), 10);
    }

    #[test]
    fn transmission_failure_mid_frame_discards() {
        let fx = fixture(2);
        fx.context.prime().unwrap();

        complete(&fx, b"AB", BufferFlags::FRAME_START);
        complete(&fx, b"CD", BufferFlags::TRANSMISSION_FAILED);
        complete(&fx, b"EF", BufferFlags::FRAME_START);
        complete(&fx, b"GH", BufferFlags::FRAME_END);

        assert_eq!(fx.sink.lock().frames, vec![b"EFGH".to_vec()]);
        let diag = fx.diagnostics.lock().clone();
        assert_eq!(diag.transmission_failures, 1);
        assert_eq!(diag.bytes_discarded, 2);
    }

    #[test]
    fn disabled_port_is_not_rearmed() {
        let fx = fixture(2);
        fx.context.prime().unwrap();
        fx.context.disable();

        complete(&fx, b"AB", BufferFlags::NONE);
        complete(&fx, b"CD", BufferFlags::NONE);

        assert_eq!(fx.transport.held(), 0);
        assert_eq!(fx.context.pool().available(), 2);
        assert_eq!(fx.context.discard_partial(), 4);
    }

    #[test]
    fn refused_rearm_returns_buffer_to_pool() {
        let fx = fixture(1);
        fx.context.prime().unwrap();
        fx.transport.refuse.store(true, Ordering::SeqCst);

        complete(&fx, b"AB", BufferFlags::FRAME);

        assert_eq!(fx.context.pool().available(), 1);
        assert_eq!(fx.diagnostics.lock().rearm_failures, 1);
        assert_eq!(fx.sink.lock().frames.len(), 1);
    }
}
