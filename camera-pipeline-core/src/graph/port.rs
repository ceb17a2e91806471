use crate::models::component::{ConnectionHandle, PortDescriptor, PortRef};
use crate::models::error::PipelineError;
use crate::models::format::{BufferRequirements, PortFormat};
use crate::traits::device::Device;

/// What currently drives a port's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortBinding {
    Unbound,
    /// Buffers come from a session-owned pool and complete through a callback.
    Pool,
    /// Buffers move through a tunnel inside the device.
    Connection(ConnectionHandle),
}

/// Controller-side view of one component port.
#[derive(Debug, Clone)]
pub struct Port {
    port_ref: PortRef,
    format: PortFormat,
    requirements: BufferRequirements,
    buffer_num: u32,
    buffer_size: u32,
    binding: PortBinding,
}

impl Port {
    pub fn new(port_ref: PortRef, descriptor: PortDescriptor) -> Self {
        let (buffer_num, buffer_size) = descriptor.requirements.resolve();
        Self {
            port_ref,
            format: descriptor.format,
            requirements: descriptor.requirements,
            buffer_num,
            buffer_size,
            binding: PortBinding::Unbound,
        }
    }

    pub fn port_ref(&self) -> PortRef {
        self.port_ref
    }

    /// The last format the device accepted for this port.
    pub fn format(&self) -> &PortFormat {
        &self.format
    }

    pub fn requirements(&self) -> BufferRequirements {
        self.requirements
    }

    pub fn buffer_num(&self) -> u32 {
        self.buffer_num
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn binding(&self) -> PortBinding {
        self.binding
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.binding, PortBinding::Connection(_))
    }

    /// True once a pool or a connection references the port.
    pub fn is_bound(&self) -> bool {
        self.binding != PortBinding::Unbound
    }

    /// Commit `format`, then size the port's buffers from the requirements
    /// the device reports for it.
    pub fn commit_format<D: Device + ?Sized>(
        &mut self,
        device: &D,
        format: PortFormat,
    ) -> Result<(), PipelineError> {
        let descriptor = device.commit_format(self.port_ref, &format)?;
        log::debug!("{}: committed {}", self.port_ref, descriptor.format);
        self.format = descriptor.format;
        self.requirements = descriptor.requirements;
        self.resolve_buffers(device)
    }

    /// Apply `max(recommended, minimum)` for both buffer count and size.
    pub fn resolve_buffers<D: Device + ?Sized>(&mut self, device: &D) -> Result<(), PipelineError> {
        let (num, size) = self.requirements.resolve();
        device.configure_buffers(self.port_ref, num, size)?;
        self.buffer_num = num;
        self.buffer_size = size;
        Ok(())
    }

    pub(crate) fn bind_pool(&mut self) -> Result<(), PipelineError> {
        match self.binding {
            PortBinding::Unbound => {
                self.binding = PortBinding::Pool;
                Ok(())
            }
            other => Err(PipelineError::InvalidState(format!(
                "{} is already bound ({:?})",
                self.port_ref, other
            ))),
        }
    }

    pub(crate) fn bind_connection(&mut self, connection: ConnectionHandle) -> Result<(), PipelineError> {
        if self.is_connected() {
            return Err(PipelineError::InvalidState(format!(
                "{} is already connected",
                self.port_ref
            )));
        }
        self.binding = PortBinding::Connection(connection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::component::ComponentHandle;

    fn port() -> Port {
        let descriptor = PortDescriptor {
            format: PortFormat::default(),
            requirements: BufferRequirements {
                num_min: 1,
                num_recommended: 3,
                size_min: 4096,
                size_recommended: 1024,
            },
        };
        Port::new(PortRef::output(ComponentHandle(7), 0), descriptor)
    }

    #[test]
    fn new_port_resolves_requirements() {
        let port = port();
        assert_eq!(port.buffer_num(), 3);
        assert_eq!(port.buffer_size(), 4096);
        assert_eq!(port.binding(), PortBinding::Unbound);
    }

    #[test]
    fn port_is_never_bound_twice() {
        let mut port = port();
        port.bind_connection(ConnectionHandle(1)).unwrap();
        assert!(matches!(
            port.bind_connection(ConnectionHandle(2)),
            Err(PipelineError::InvalidState(_))
        ));
        assert!(port.bind_pool().is_err());
        assert!(port.is_bound());
    }

    #[test]
    fn pool_binding_counts_as_bound() {
        let mut port = port();
        assert!(!port.is_bound());
        port.bind_pool().unwrap();
        assert!(port.is_bound());
        assert!(!port.is_connected());
        assert!(port.bind_pool().is_err());
    }
}
