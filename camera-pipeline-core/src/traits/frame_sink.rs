use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::PipelineError;
use crate::models::frame::Frame;

/// Destination for completed frames.
///
/// `close` on a sink that was never opened succeeds and does nothing.
/// `open` on a sink that is already open closes the first resource before
/// acquiring the new one.
pub trait FrameSink: Send {
    fn open(&mut self) -> Result<(), PipelineError>;

    /// Called from the device's completion thread, once per frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError>;

    fn close(&mut self) -> Result<(), PipelineError>;

    fn is_open(&self) -> bool;
}

/// A sink shared between the session and its completion handlers.
pub type SharedSink = Arc<Mutex<dyn FrameSink>>;
