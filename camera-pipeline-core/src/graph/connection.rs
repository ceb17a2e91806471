use crate::models::component::{ConnectionFlags, ConnectionHandle, PortRef};
use crate::models::error::PipelineError;
use crate::traits::device::Device;

/// A tunnel from an output port to an input port.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    source: PortRef,
    sink: PortRef,
    flags: ConnectionFlags,
    enabled: bool,
}

impl Connection {
    pub fn create<D: Device + ?Sized>(
        device: &D,
        source: PortRef,
        sink: PortRef,
        flags: ConnectionFlags,
    ) -> Result<Self, PipelineError> {
        let handle = device.create_connection(source, sink, flags)?;
        log::info!("connected {} -> {}", source, sink);
        Ok(Self {
            handle,
            source,
            sink,
            flags,
            enabled: false,
        })
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn source(&self) -> PortRef {
        self.source
    }

    pub fn sink(&self) -> PortRef {
        self.sink
    }

    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable<D: Device + ?Sized>(&mut self, device: &D) -> Result<(), PipelineError> {
        device.enable_connection(self.handle)?;
        self.enabled = true;
        Ok(())
    }

    pub fn disable<D: Device + ?Sized>(&mut self, device: &D) -> Result<(), PipelineError> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;
        device.disable_connection(self.handle)
    }

    /// Disable (if enabled) and destroy. Failures are logged.
    pub fn destroy<D: Device + ?Sized>(mut self, device: &D) {
        if let Err(e) = self.disable(device) {
            log::warn!("failed to disable connection {} -> {}: {}", self.source, self.sink, e);
        }
        if let Err(e) = device.destroy_connection(self.handle) {
            log::warn!("failed to destroy connection {} -> {}: {}", self.source, self.sink, e);
        }
    }
}
