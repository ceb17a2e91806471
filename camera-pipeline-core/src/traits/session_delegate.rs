use crate::models::error::PipelineError;
use crate::models::frame::FrameMetadata;
use crate::models::state::PipelineState;

/// Event delegate for capture session notifications.
///
/// State changes are reported from the controller thread. Frame deliveries
/// and completion-phase errors are reported from the device's completion
/// thread; implementations must not block.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &PipelineState);

    /// Called after a frame has been handed to the sink.
    fn on_frame_delivered(&self, metadata: &FrameMetadata);

    /// Called for errors that do not reach the caller: failed transmissions,
    /// sink write failures, re-arm failures.
    fn on_error(&self, error: &PipelineError);
}
