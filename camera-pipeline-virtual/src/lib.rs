//! # camera-pipeline-virtual
//!
//! In-memory camera backend for camera-pipeline-core.
//!
//! Provides:
//! - `VirtualDevice`: camera, encoders, splitter and null sink with tunnels,
//!   buffer queues and a capture thread that emits synthetic JPEG, PNG and
//!   H.264 frames
//! - `VirtualDeviceBuilder`: fault injection for setup and streaming failures
//! - `DeviceEvent`: log of every call the device received, for ordering checks
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use camera_pipeline_core::{CaptureSession, FileSink, SessionConfiguration};
//! use camera_pipeline_virtual::VirtualDevice;
//!
//! let device = Arc::new(VirtualDevice::new());
//! let mut session = CaptureSession::new(device, 0);
//! session.start_pipeline(&SessionConfiguration::default(), Arc::new(parking_lot::Mutex::new(FileSink::new("still.png"))))?;
//! let frame = session.capture_still()?;
//! ```

mod capture;
pub mod device;
pub mod payload;
pub mod state;

pub use device::{VirtualDevice, VirtualDeviceBuilder};
pub use state::DeviceEvent;
