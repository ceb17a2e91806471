//! # camera-pipeline-core
//!
//! Device-agnostic camera capture pipeline controller.
//!
//! Builds a camera → (splitter →) encoder graph on any backend implementing
//! [`Device`], negotiates port formats, allocates buffer pools, runs the
//! buffer completion protocol, and tears everything down in a safe order.
//! Encoded frames go to a [`FrameSink`]: a file with a JSON sidecar, or a
//! length-prefixed TCP stream.
//!
//! ## Architecture
//!
//! ```text
//! camera-pipeline-core (this crate)
//! ├── traits/       ← Device, BufferTransport, FrameSink, SessionDelegate
//! ├── models/       ← PipelineError, PipelineState, formats, parameters, encoder policy
//! ├── graph/        ← Component, Port, Connection, ComponentGraph
//! ├── pool/         ← Buffer, BufferFlags, BufferPool
//! ├── processing/   ← completion protocol, frame assembly, negotiation
//! ├── session/      ← CaptureSession (generic orchestrator)
//! └── storage/      ← FileSink, StreamSink, metadata
//! ```

pub mod graph;
pub mod models;
pub mod pool;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use graph::component_graph::{ComponentGraph, PortName};
pub use models::component::{ComponentHandle, ComponentKind, ConnectionHandle, PortDirection, PortRef};
pub use models::config::{CameraConfig, CaptureMode, RouterConfig, SensorMode, SessionConfiguration};
pub use models::diagnostics::{PoolStats, SessionDiagnostics};
pub use models::encoder::{EncoderPolicy, H264Level, H264Profile, H264Settings, JpegSettings};
pub use models::error::PipelineError;
pub use models::format::{Encoding, PortFormat, Rational, VideoFormat};
pub use models::frame::{Frame, FrameMetadata};
pub use models::params::{AwbMode, CameraParameters, CameraUseCase, ExposureMode, Parameter, ParameterId};
pub use models::record::{CaptureRecord, CaptureResult};
pub use models::state::PipelineState;
pub use pool::buffer::{Buffer, BufferFlags};
pub use pool::buffer_pool::BufferPool;
pub use session::capture_session::CaptureSession;
pub use storage::file_sink::FileSink;
pub use storage::stream_sink::StreamSink;
pub use traits::device::{BufferCallback, BufferTransport, ControlCallback, Device};
pub use traits::frame_sink::{FrameSink, SharedSink};
pub use traits::session_delegate::SessionDelegate;
