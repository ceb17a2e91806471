use std::sync::Arc;

use crate::models::component::{
    ComponentDescriptor, ComponentHandle, ComponentKind, ConnectionFlags, ConnectionHandle,
    ControlEvent, PortDescriptor, PortRef,
};
use crate::models::error::PipelineError;
use crate::models::format::PortFormat;
use crate::models::params::{Parameter, ParameterId};
use crate::pool::buffer::{Buffer, RejectedBuffer};
use crate::pool::buffer_pool::BufferPool;

/// Callback invoked when the device hands a buffer back to its owner.
///
/// Fires on a device-owned thread. The handler takes ownership of the buffer
/// and must return it to its pool.
pub type BufferCallback = Arc<dyn Fn(Buffer) + Send + Sync + 'static>;

/// Callback invoked for events on a component's control port.
pub type ControlCallback = Arc<dyn Fn(ComponentHandle, ControlEvent) + Send + Sync + 'static>;

/// The one device call completion handlers need: re-sending a buffer.
pub trait BufferTransport: Send + Sync {
    /// Queue `buffer` on an enabled port.
    ///
    /// On failure the buffer comes back inside the error so the caller can
    /// return it to its pool.
    fn send_buffer(&self, port: PortRef, buffer: Buffer) -> Result<(), RejectedBuffer>;
}

/// Interface to the camera/encoder hardware.
///
/// Implemented by:
/// - `VirtualDevice` (software backend in `camera-pipeline-virtual`)
///
/// Every call is synchronous from the controller's side. Completion
/// callbacks arrive later on a thread the device owns.
pub trait Device: BufferTransport {
    /// Instantiate a component by its constructor name.
    fn create_component(&self, kind: ComponentKind) -> Result<ComponentDescriptor, PipelineError>;

    /// Release a disabled component. The handle is invalid afterwards.
    fn destroy_component(&self, component: ComponentHandle) -> Result<(), PipelineError>;

    fn enable_component(&self, component: ComponentHandle) -> Result<(), PipelineError>;

    fn disable_component(&self, component: ComponentHandle) -> Result<(), PipelineError>;

    /// Commit `format` to a port and report the port's resulting format and
    /// buffer requirements.
    fn commit_format(&self, port: PortRef, format: &PortFormat) -> Result<PortDescriptor, PipelineError>;

    /// Set the buffer count and size the port will use.
    fn configure_buffers(&self, port: PortRef, num: u32, size: u32) -> Result<(), PipelineError>;

    fn set_parameter(&self, port: PortRef, parameter: &Parameter) -> Result<(), PipelineError>;

    fn get_parameter(&self, port: PortRef, id: ParameterId) -> Result<Parameter, PipelineError>;

    /// Enable a data port. Ports bound to a pool need a callback; tunnelled
    /// ports are enabled by their connection instead.
    fn enable_port(&self, port: PortRef, callback: Option<BufferCallback>) -> Result<(), PipelineError>;

    /// Enable a component's control port.
    fn enable_control_port(
        &self,
        component: ComponentHandle,
        callback: ControlCallback,
    ) -> Result<(), PipelineError>;

    /// Disable a port. Buffers the device still holds are flushed back
    /// through the port's callback before this returns, and the callback is
    /// dropped.
    fn disable_port(&self, port: PortRef) -> Result<(), PipelineError>;

    /// Allocate a pool for a port's negotiated count and size.
    fn create_pool(&self, port: PortRef, num: u32, size: u32) -> Result<BufferPool, PipelineError> {
        BufferPool::new(port, num, size)
    }

    fn destroy_pool(&self, pool: BufferPool) -> Result<(), PipelineError> {
        drop(pool);
        Ok(())
    }

    fn create_connection(
        &self,
        source: PortRef,
        sink: PortRef,
        flags: ConnectionFlags,
    ) -> Result<ConnectionHandle, PipelineError>;

    fn enable_connection(&self, connection: ConnectionHandle) -> Result<(), PipelineError>;

    fn disable_connection(&self, connection: ConnectionHandle) -> Result<(), PipelineError>;

    fn destroy_connection(&self, connection: ConnectionHandle) -> Result<(), PipelineError>;
}
